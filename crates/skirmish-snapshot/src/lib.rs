//! Durable snapshots for Skirmish rooms.
//!
//! Rooms periodically serialize their [`RoomState`](skirmish_game::RoomState)
//! into a [`SnapshotRecord`] and hand it to a [`SnapshotStore`]. After a
//! restart, [`recover`] rebuilds every room that was still running and
//! records a [`RoomRemap`] from its old id to the new one, which clients
//! can look up through [`locate`].
//!
//! ```text
//! room actor ──(every 5 s)──→ encode_state ──→ store.upsert
//!
//! startup: store.load_active ──→ decode_state ──→ new room
//!                                       └──→ put_remap(old → new), deactivate(old)
//! ```
//!
//! Two stores ship with the crate: [`MemoryStore`] and [`FileStore`].

mod codec;
mod error;
mod file;
mod memory;
mod record;
mod recovery;
mod store;

pub use codec::{decode_state, encode_state};
pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::{RoomRemap, SnapshotRecord};
pub use recovery::{MAX_REMAP_HOPS, RecoveryReport, locate, recover};
pub use store::SnapshotStore;
