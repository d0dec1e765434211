#![doc = include_str!("../README.md")]
#![warn(missing_debug_implementations, missing_docs, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
extern crate tracing;

pub mod errors;

mod hint;
pub use hint::HintType;

mod output;
pub use output::{OutputV0, OUTPUT_V0_LENGTH};

mod config;
pub use config::{ChainGenesis, ChainOpConfig, RollupConfig};

mod block;
pub use block::{is_deposit, transactions_root, L2Block};

pub mod l2;

pub mod kv;
pub use kv::{KeyValueStore, MemoryKv, OracleBackedDb, StateDatabase};

pub mod canonical;

pub mod chain;

pub mod engine;

pub mod derivation;

pub mod boot;
pub use boot::BootInfo;

mod program;
pub use program::{run_single_chain, validate_claim};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
