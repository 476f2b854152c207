//! # AtlasBlock
//!
//! Durable, disk-backed block storage with:
//! - Byte-addressable persistent buffers (direct I/O, one mapping, or chunked mappings)
//! - Fixed-stride and buddy block allocators on top of them
//! - Pluggable binary serializers
//! - A crash-ordered persistent doubly linked list
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 PersistentLinkedList<T>                      │
//! │         (two barriers per insert / remove)                   │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌────────────────────────┐       ┌────────────────────┐
//!   │      BlockBuffer       │       │   Serializer<T>    │
//!   │  (Fixed | Dynamic)     │       │ (primitive | bytes │
//!   └───────────┬────────────┘       │  | string | serde) │
//!               │                    └────────────────────┘
//!               ▼
//!   ┌────────────────────────┐
//!   │   PersistentBuffer     │
//!   │ (Direct | Mapped |     │
//!   │  ChunkedMapped)        │
//!   └───────────┬────────────┘
//!               ▼
//!         file / mapping
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use atlasblock::{Config, PersistentLinkedList};
//!
//! # fn main() -> atlasblock::Result<()> {
//! let config = Config::builder().path("names.dat").build();
//! let mut list = PersistentLinkedList::<String, _>::open(&config)?;
//! list.add(&"a".to_string())?;
//! assert_eq!(list.get(0)?, Some("a".to_string()));
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod buffer;
pub mod serializer;
pub mod block;
pub mod select;
pub mod list;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::{BarrierPolicy, Config};
pub use buffer::PersistentBuffer;
pub use block::{BlockBuffer, BlockId};
pub use serializer::{BufferedSerializer, Persist, Serializer};
pub use select::{open_block_buffer, open_buffer, BufferKind};
pub use list::{Cursor, PersistentLinkedList, SharedList};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasBlock
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
