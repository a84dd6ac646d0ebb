pub mod directory_target;

pub use directory_target::DirectoryBackupTarget;
