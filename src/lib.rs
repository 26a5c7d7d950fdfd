// Copyright (c) Microsoft Corporation.

// Round-based coordination between a fixed set of worker threads and one generator thread. Every round the
// workers multiply the current pair of square operand matrices; once all of them arrived at the barrier the
// generator grows the dimension, builds fresh operands and releases the next round.

pub mod cli;
pub mod cycle;
pub mod driver;
pub mod generator;
pub mod matrix;
pub mod report;
pub mod shutdown;
pub mod worker;
