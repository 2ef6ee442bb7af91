//! Resolution of filter ids to codecs exported by shared-library plugins.

pub mod abi;
pub mod loader;
pub mod table;

pub use abi::{DynamicCodec, RawFilterClass};
pub use loader::{PluginKind, PluginLoader, PluginPath, StaticPluginPath, is_shared_library};
pub use table::{CodecTable, KnownPlugin, OpenMode, known_plugin};
