//! HandBrake encoder module for Transcode Watcher
//!
//! Builds the encoder invocation for one job. The encoder writes progress
//! to stdout and diagnostics to stderr; both are piped back to the runner.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Parameters for one encoder invocation
#[derive(Debug, Clone)]
pub struct HandbrakeParams {
    /// Encoder binary
    pub handbrake_cli: PathBuf,
    /// Path to the source file
    pub input_path: PathBuf,
    /// Path for the encoded output file
    pub output_path: PathBuf,
    /// Configured encoder arguments, without input/output flags
    pub transcoding: Vec<String>,
}

impl HandbrakeParams {
    pub fn new(
        handbrake_cli: PathBuf,
        input_path: PathBuf,
        output_path: PathBuf,
        transcoding: Vec<String>,
    ) -> Self {
        Self {
            handbrake_cli,
            input_path,
            output_path,
            transcoding,
        }
    }
}

/// Build the encoder command
///
/// The invocation is `<cli> --input <file> --output <output> <transcoding...>`
/// with stdout and stderr piped. The child is killed if the command's
/// handle is dropped before it exits.
pub fn build_handbrake_command(params: &HandbrakeParams) -> Command {
    let mut cmd = Command::new(&params.handbrake_cli);

    cmd.arg("--input").arg(&params.input_path);
    cmd.arg("--output").arg(&params.output_path);
    cmd.args(&params.transcoding);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::ffi::OsStr;

    /// Helper to convert Command args to a Vec of strings for easier testing
    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn path_strategy() -> impl Strategy<Value = String> {
        prop::string::string_regex("/[a-zA-Z0-9_/.-]{1,50}").unwrap()
    }

    #[test]
    fn test_command_layout() {
        let params = HandbrakeParams::new(
            PathBuf::from("/usr/bin/HandBrakeCLI"),
            PathBuf::from("/in/a.mkv"),
            PathBuf::from("/out/a.mkv"),
            vec!["--encoder".to_string(), "x265".to_string()],
        );

        let cmd = build_handbrake_command(&params);

        assert_eq!(cmd.as_std().get_program(), OsStr::new("/usr/bin/HandBrakeCLI"));
        assert_eq!(
            get_command_args(&cmd),
            vec!["--input", "/in/a.mkv", "--output", "/out/a.mkv", "--encoder", "x265"]
        );
    }

    // Input and output always lead the argument list, followed by the configured
    // arguments verbatim and in order
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_command_prefix_then_configured_args(
            input_path in path_strategy(),
            output_path in path_strategy(),
            transcoding in proptest::collection::vec("[a-zA-Z0-9=-]{1,12}", 0..8),
        ) {
            let params = HandbrakeParams::new(
                PathBuf::from("HandBrakeCLI"),
                PathBuf::from(&input_path),
                PathBuf::from(&output_path),
                transcoding.clone(),
            );

            let args = get_command_args(&build_handbrake_command(&params));

            prop_assert_eq!(&args[..4], &["--input".to_string(), input_path, "--output".to_string(), output_path][..]);
            prop_assert_eq!(&args[4..], &transcoding[..]);
        }
    }
}
