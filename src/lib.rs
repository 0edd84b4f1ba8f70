pub mod core;
pub mod orchestration;
pub mod security;
pub mod steps;

pub use self::core::*;
pub use orchestration::{ReleasePipeline, ReleaseReport};
pub use security::{CommandError, SafeCommandExecutor, SecretMasker};
pub use steps::{
    CommandPackageBuilder, CredentialProvisioner, DistributionBuilder, PackageBuilder,
    PublishReceipt, Publisher, ToolOutput, TwineUploadClient, UploadClient, VersionMarker,
    VersionStamper,
};
