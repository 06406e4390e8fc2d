//! Tree model interface.
//!
//! The adapter treats the tree model as an external collaborator: it reads
//! node state through [`TreeModel`], receives [`TreeEvent`] notifications via
//! a [`TreeSubscription`], and mutates the model only through the trait's
//! `*_from_ui` facade.
//!
//! [`Tree`] is an in-memory implementation suitable for embedders without a
//! model of their own and for tests.

mod source;
mod tree;
mod types;

pub use source::{Subscribers, SubscriptionId, TreeModel, TreeSubscription};
pub use tree::{NewNode, Tree};
pub use types::{Cell, NodeKey, TreeEvent, TreeNode, TreeProperties};
