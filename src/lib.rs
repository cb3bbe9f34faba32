//! domprune: frame-tree DOM pruning
//!
//! Removes elements matching user-supplied selectors from a page and every
//! frame reachable within it, then keeps re-applying the selectors for a
//! bounded window while frames load and content mutates.
//!
//! Layers, innermost first:
//! - [`domain`]: selector directives and the
//!   [`DocumentTree`](domain::DocumentTree) host abstraction
//! - [`application`]: pruning, traversal, remote execution, scheduling and the session
//! - [`infrastructure`]: the scraper-backed page, bundles, stores, clocks
//! - [`cli`]: argument parsing and command dispatch

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
