//! Startup checks module for Transcode Watcher
//!
//! Provides preflight checks run before the dispatch loop starts:
//! - Encoder arguments must not carry their own input/output flags
//! - The encoder binary must exist and be executable

use crate::config::Config;
use std::path::Path;
use thiserror::Error;

/// Flags the job runner supplies itself
const RESERVED_FLAGS: &[&str] = &["--input", "-i", "--output", "-o"];

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Reserved encoder flag in transcoding arguments: {0}")]
    ReservedFlag(String),
}

/// Return the reserved flag an argument spells, if any
///
/// Matches both `--output` and `--output=<path>` forms.
pub fn detect_reserved_flag(arg: &str) -> Option<&'static str> {
    let name = arg.split_once('=').map_or(arg, |(name, _)| name);
    RESERVED_FLAGS.iter().find(|&&flag| flag == name).copied()
}

/// Check the configured encoder arguments for input/output flags
///
/// Input and output are always passed by the job runner; a second pair
/// would leave the encoder's behaviour undefined.
pub fn check_transcoding_args(args: &[String]) -> Result<(), StartupError> {
    for arg in args {
        if let Some(flag) = detect_reserved_flag(arg) {
            return Err(StartupError::ReservedFlag(format!(
                "'{}' found in '{}'; input and output are set per job",
                flag, arg
            )));
        }
    }

    Ok(())
}

/// Check that the encoder binary exists and can be executed
pub fn check_encoder_available(path: &Path) -> Result<(), StartupError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        StartupError::EncoderUnavailable(format!(
            "{}: {}; is HandBrakeCLI installed?",
            path.display(),
            e
        ))
    })?;

    if !metadata.is_file() {
        return Err(StartupError::EncoderUnavailable(format!(
            "{} is not a file",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(StartupError::EncoderUnavailable(format!(
                "{} is not executable",
                path.display()
            )));
        }
    }

    Ok(())
}

/// Run all startup checks in order
pub fn run_startup_checks(config: &Config) -> Result<(), StartupError> {
    check_transcoding_args(&config.transcoding)?;
    check_encoder_available(&config.handbrake_cli)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_reserved_flag() {
        assert_eq!(detect_reserved_flag("--input"), Some("--input"));
        assert_eq!(detect_reserved_flag("-o"), Some("-o"));
        assert_eq!(detect_reserved_flag("--output=/tmp/x.mkv"), Some("--output"));
        assert_eq!(detect_reserved_flag("--encoder"), None);
        assert_eq!(detect_reserved_flag("--optimize"), None);
        assert_eq!(detect_reserved_flag("x265"), None);
    }

    #[test]
    fn test_default_transcoding_args_pass() {
        assert!(check_transcoding_args(&Config::default().transcoding).is_ok());
    }

    #[test]
    fn test_transcoding_args_with_output_rejected() {
        let args = vec![
            "--encoder".to_string(),
            "x265".to_string(),
            "--output".to_string(),
            "/tmp/override.mkv".to_string(),
        ];
        let result = check_transcoding_args(&args);
        assert!(matches!(result, Err(StartupError::ReservedFlag(_))));
    }

    #[test]
    fn test_missing_encoder_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let result = check_encoder_available(&temp.path().join("HandBrakeCLI"));
        assert!(matches!(result, Err(StartupError::EncoderUnavailable(_))));
    }

    #[test]
    fn test_directory_is_not_an_encoder() {
        let temp = TempDir::new().unwrap();
        let result = check_encoder_available(temp.path());
        assert!(matches!(result, Err(StartupError::EncoderUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_must_be_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let encoder = temp.path().join("HandBrakeCLI");
        std::fs::write(&encoder, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(check_encoder_available(&encoder).is_err());

        std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(check_encoder_available(&encoder).is_ok());
    }

    // Ordinary encoder arguments never trip the reserved-flag check
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_plain_args_never_reserved(
            args in proptest::collection::vec("--(encoder|quality|all-audio|aencoder|preset)(=[a-z0-9]{1,6})?", 0..10),
        ) {
            prop_assert!(check_transcoding_args(&args).is_ok());
        }

        #[test]
        fn prop_reserved_flag_anywhere_rejected(
            before in proptest::collection::vec("[a-z0-9]{1,8}", 0..5),
            flag in prop_oneof![Just("--input"), Just("-i"), Just("--output"), Just("-o")],
            after in proptest::collection::vec("[a-z0-9]{1,8}", 0..5),
        ) {
            let mut args = before;
            args.push(flag.to_string());
            args.extend(after);
            prop_assert!(check_transcoding_args(&args).is_err());
        }
    }
}
