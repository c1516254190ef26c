//! Host store: the on-disk persistence layer under the configured host
//! root (`<host_dir>/<host_name>/...`). Every write goes through an
//! atomic tmpfile-rename and a per-host cooperative lock so that a
//! concurrent `list`/`gc` never observes a torn write.

pub mod atomic;
pub mod certified;
pub mod lock;

pub use atomic::{write_atomic, write_atomic_private, write_json_atomic};
pub use certified::CertifiedHostData;
pub use lock::{lock_host, try_lock_host, HostLock};
