//! Relation descriptors, batched eager loading and pivot maintenance.
//!
//! Relations are declared once per model as a [`Relations`] table:
//!
//! ```rust,ignore
//! fn relations() -> Relations {
//!     Relations::new()
//!         .with(RelationDescriptor::has_many::<User, Post>("posts").on_delete(OnDelete::Cascade))
//!         .with(RelationDescriptor::belongs_to_many::<User, Role>("roles").with_pivot(["granted_at"]))
//!         .with(RelationDescriptor::morph_many::<User, Comment>("comments", "commentable"))
//! }
//! ```
//!
//! Eager loading a relation over any number of parents costs one query:
//!
//! ```rust,ignore
//! let users = User::query(&engine)
//!     .with(["posts.comments", "roles"])
//!     .get()
//!     .await?;
//! ```

mod descriptor;
mod loader;
mod pivot;

pub use descriptor::{OnDelete, PivotSpec, RelationDescriptor, RelationKind, Relations};
pub use loader::{Constraint, EagerLoad, load_relations};
pub use pivot::{Pivot, SyncResult};
