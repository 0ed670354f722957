mod backup;
mod config;
mod login;
mod preset;
mod restore;

// Login commands
pub use login::{describe_phase, run_login, run_logout};

// Preset commands
pub use preset::{
    apply_options, create_preset, delete_preset, edit_preset, list_presets, print_patterns,
    show_preset, sync_presets,
};

// Backup commands
pub use backup::run_backup;

// Restore and history commands
pub use restore::{list_archive_files, list_archives, restore_archive, show_history};

// Config commands
pub use config::{set_config, show_config, show_config_path};
