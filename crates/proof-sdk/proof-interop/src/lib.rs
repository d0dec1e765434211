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

pub mod boot;
pub use boot::BootInfo;

mod oracle;
pub use oracle::ConsolidateOracle;

pub mod deposits;

mod linker;
pub use linker::ConfigLinker;

mod consolidation;
pub use consolidation::{run_consolidation, Consolidator};

mod program;
pub use program::{run_interop_program, state_transition};
