//! # om-config
//!
//! Builds the final configuration document handed to the director.
//!
//! A base YAML document is layered with, in increasing precedence:
//!
//! 1. `PREFIX_name=value` pairs from the environment, for each prefix
//! 2. YAML variable files, in the order given
//! 3. `name=value` overrides from the command line
//!
//! `((name))` placeholders are substituted in one pass, then overlay files
//! (`replace`, `remove`, `test` operations) are applied in order.
//!
//! ```rust,no_run
//! use om_config::{LoadOptions, Merger};
//!
//! # fn example() -> om_config::Result<()> {
//! let merger = Merger::new(LoadOptions {
//!     vars: vec!["network=default".to_string()],
//!     ..Default::default()
//! });
//! let tree = merger.load_tree(std::path::Path::new("product.yml"))?;
//! for key in tree.unknown_keys() {
//!     println!("carrying unrecognized key {:?}", key);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod overlay;
pub mod placeholder;
pub mod section;
pub mod vars;

pub use error::{ConfigError, Result};
pub use loader::{render, render_selection, select, LoadOptions, Merger, MissingPolicy};
pub use overlay::{Operation, Overlay, Pointer};
pub use placeholder::Substitution;
pub use section::{ConfigTree, Section, SectionKind};
pub use vars::VariablePool;
