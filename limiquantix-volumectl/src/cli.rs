//! Command-line argument parsing.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use limiquantix_volume::{AttachmentRequest, BackendKind};

/// limiquantix Volume Control - inspect and bind block-storage volumes
#[derive(Parser, Debug)]
#[command(name = "limiquantix-volumectl")]
#[command(about = "limiquantix Volume Control - inspect and bind block-storage volumes")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, env = "LIMIQUANTIX_VOLUME_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Log format (pretty, json)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Storage backend, overriding the configuration file
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Pool used for bare volume names
    #[arg(long)]
    pub default_pool: Option<String>,

    /// Identity reported on local attachments
    #[arg(long)]
    pub instance_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every volume
    List(AttachmentFlags),

    /// Show one volume
    Inspect {
        /// Volume ID (`<pool>.<image>` or a bare name)
        id: String,
        #[command(flatten)]
        attachments: AttachmentFlags,
    },

    /// Create a volume
    Create {
        name: String,
        /// Size in GiB
        #[arg(long)]
        size: u64,
    },

    /// Delete a volume
    Remove { id: String },

    /// Map a volume on this host
    Attach { id: String },

    /// Unmap a volume from this host
    Detach { id: String },
}

#[derive(ClapArgs, Debug, Default, Clone, Copy)]
pub struct AttachmentFlags {
    /// Resolve attachment state
    #[arg(long)]
    pub attachments: bool,

    /// Resolve attachment state and local device paths
    #[arg(long)]
    pub devices: bool,
}

impl AttachmentFlags {
    pub fn request(self) -> AttachmentRequest {
        if self.devices {
            AttachmentRequest::Devices
        } else if self.attachments {
            AttachmentRequest::Attachments
        } else {
            AttachmentRequest::None
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    Rbd,
    Xtremio,
    Mock,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Rbd => BackendKind::Rbd,
            BackendArg::Xtremio => BackendKind::Xtremio,
            BackendArg::Mock => BackendKind::Mock,
        }
    }
}
