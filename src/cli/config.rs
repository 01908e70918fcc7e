//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{OutputFormat, SessionConfig},
    services::ImageOutputEncoder,
    types::RefinementParameter,
};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Default output name stem suffix
const OUTPUT_SUFFIX: &str = "background-removed";

/// Convert CLI arguments to a `SessionConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the session configuration: config file first, flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<SessionConfig> {
        let mut config = match &cli.config {
            Some(path) => SessionConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(value) = cli.refine {
            let parameter = RefinementParameter::new(value);
            if parameter.value() != value {
                log::warn!("Refinement {} is out of range, using {}", value, parameter);
            }
            config.initial_parameter = parameter;
        }
        if cli.defringe {
            config.compositor.defringe = true;
        }
        config.output_format = Self::output_format(cli, &config);
        config.verbose_progress = config.verbose_progress || cli.verbose > 0;

        config.validate()?;
        Ok(config)
    }

    /// Validate CLI arguments before any work starts
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if !cli.input.is_file() {
            anyhow::bail!("Input file does not exist: {}", cli.input.display());
        }
        if let Some(mask) = &cli.mask {
            if !mask.is_file() {
                anyhow::bail!("Mask file does not exist: {}", mask.display());
            }
        }
        if cli.sweep {
            if let Some(output) = &cli.output {
                if output.is_file() {
                    anyhow::bail!(
                        "--sweep writes one file per refinement; --output must be a directory"
                    );
                }
            }
        }
        Ok(())
    }

    /// Explicit `--format`, then the output extension, then the configured format
    pub(crate) fn output_format(cli: &Cli, config: &SessionConfig) -> OutputFormat {
        if let Some(format) = cli.format {
            return format.into();
        }
        if !cli.sweep {
            if let Some(format) = cli.output.as_ref().and_then(ImageOutputEncoder::format_for_path) {
                return format;
            }
        }
        config.output_format
    }

    /// Output path for a single render, or for one sweep render when
    /// `parameter` is given
    pub(crate) fn output_path(
        cli: &Cli,
        format: OutputFormat,
        parameter: Option<RefinementParameter>,
    ) -> PathBuf {
        let stem = cli
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");

        match parameter {
            Some(parameter) => {
                let directory = cli
                    .output
                    .clone()
                    .or_else(|| cli.input.parent().map(PathBuf::from))
                    .unwrap_or_default();
                directory.join(format!(
                    "{}-refine{}.{}",
                    stem,
                    parameter,
                    format.extension()
                ))
            },
            None => cli.output.clone().unwrap_or_else(|| {
                cli.input
                    .with_file_name(format!("{}-{}.{}", stem, OUTPUT_SUFFIX, format.extension()))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliOutputFormat;
    use std::path::Path;

    fn create_test_cli() -> Cli {
        Cli {
            input: PathBuf::from("photos/portrait.jpg"),
            mask: None,
            refine: None,
            defringe: false,
            format: None,
            output: None,
            sweep: false,
            config: None,
            json_logs: false,
            verbose: 0,
        }
    }

    #[test]
    fn test_cli_config_conversion() {
        let mut cli = create_test_cli();
        cli.refine = Some(-4);
        cli.defringe = true;
        cli.format = Some(CliOutputFormat::Tiff);

        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.initial_parameter.value(), -4);
        assert!(config.compositor.defringe);
        assert_eq!(config.output_format, OutputFormat::Tiff);
    }

    #[test]
    fn test_refine_is_clamped() {
        let mut cli = create_test_cli();
        cli.refine = Some(-40);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.initial_parameter.value(), -10);
    }

    #[test]
    fn test_config_file_with_flag_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{ "initial_parameter": 6, "compositor": { "defringe_radius": 3 } }"#,
        )
        .unwrap();

        let mut cli = create_test_cli();
        cli.config = Some(path);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.initial_parameter.value(), 6);
        assert_eq!(config.compositor.defringe_radius, 3);

        cli.refine = Some(1);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.initial_parameter.value(), 1);
    }

    #[test]
    fn test_output_format_resolution() {
        let mut cli = create_test_cli();
        let defaults = SessionConfig::default();
        assert_eq!(CliConfigBuilder::output_format(&cli, &defaults), OutputFormat::Png);

        cli.output = Some(PathBuf::from("out/cutout.webp"));
        assert_eq!(CliConfigBuilder::output_format(&cli, &defaults), OutputFormat::WebP);

        cli.format = Some(CliOutputFormat::Rgba8);
        assert_eq!(CliConfigBuilder::output_format(&cli, &defaults), OutputFormat::Rgba8);
    }

    #[test]
    fn test_output_paths() {
        let mut cli = create_test_cli();
        assert_eq!(
            CliConfigBuilder::output_path(&cli, OutputFormat::Png, None),
            Path::new("photos/portrait-background-removed.png")
        );
        assert_eq!(
            CliConfigBuilder::output_path(&cli, OutputFormat::Tiff, Some(RefinementParameter::new(-3))),
            Path::new("photos/portrait-refine-3.tiff")
        );

        cli.output = Some(PathBuf::from("renders"));
        assert_eq!(
            CliConfigBuilder::output_path(&cli, OutputFormat::Png, Some(RefinementParameter::new(2))),
            Path::new("renders/portrait-refine+2.png")
        );
    }

    #[test]
    fn test_cli_validation() {
        let cli = create_test_cli();
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        std::fs::write(&input, b"not checked here").unwrap();
        let mut cli = create_test_cli();
        cli.input = input.clone();
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        cli.sweep = true;
        cli.output = Some(input);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }
}
