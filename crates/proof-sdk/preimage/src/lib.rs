#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod errors;

mod key;
pub use key::{PreimageKey, PreimageKeyType};

mod oracle;
pub use oracle::{OracleReader, OracleServer};

mod hint;
pub use hint::{HintReader, HintWriter};

mod client;
pub use client::OracleClient;

mod traits;
pub use traits::{
    Channel, CommsClient, HintRouter, HintWriterClient, PreimageFetcher, PreimageOracleClient,
};

#[cfg(any(test, feature = "std"))]
mod pipe;
#[cfg(any(test, feature = "std"))]
pub use pipe::{BidirectionalPipe, PipeChannel};
