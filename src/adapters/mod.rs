// Adapters - External system implementations

pub mod command_notify;
pub mod fs_archive;
pub mod http_submit;
pub mod probe_ffprobe;
pub mod ssh_remote;
pub mod tracing_log;

// Re-export adapters
pub use command_notify::CommandNotifyAdapter;
pub use fs_archive::FsArchiveAdapter;
pub use http_submit::HttpSubmitAdapter;
pub use probe_ffprobe::FFprobeAdapter;
pub use ssh_remote::{SshRemoteAdapter, SshSettings};
pub use tracing_log::TracingNotifyAdapter;
