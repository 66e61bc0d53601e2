//! System call marshalling generator.
//!
//! From a list of system call signatures, `sysgen` emits the user-side trap
//! wrappers, the kernel-side handlers that rebuild each call from six
//! register words (plus an overflow block when needed), and the dispatch
//! table with its call-id listing.
//!
//! Pipeline: [`signature`] → [`width`] → [`slots`] → [`wrapper`] and
//! [`handler`] → [`dispatch`], driven by [`generate`].

pub mod cfrag;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod generate;
pub mod handler;
pub mod logger;
pub mod signature;
pub mod slots;
pub mod width;
pub mod wire;
pub mod wrapper;

pub use error::{GenError, Result};
pub use generate::{Artifacts, GenOptions, OutputPaths, generate};
pub use signature::{Signature, SyscallSet};
pub use slots::{SlotPlan, SlotRef};
pub use width::WidthClassifier;
