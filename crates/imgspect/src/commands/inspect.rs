//! Image inspection command

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, ValueEnum};
use imgspect_core::{HierarchicalConfigLoader, RuntimeConfig};
use imgspect_image::{inspect, ConnectionContext, Credentials, ImageReference, InspectOptions, Inspection};
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info};

/// How inspection results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One `Key: <k> => Element: <v>` line per label
    Lines,
    /// The full inspection document as JSON
    Json,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Image reference, e.g. registry://quay.io/coreos/etcd:v3.5.0
    pub image: String,

    /// Require HTTPS and verify certificates (--tls-verify=false to disable)
    #[arg(
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub tls_verify: Option<bool>,

    /// Directory of extra *.crt root certificates
    #[arg(long, value_name = "DIR")]
    pub cert_dir: Option<Utf8PathBuf>,

    /// Registry credentials as username:password
    #[arg(
        long,
        env = "IMGSPECT_CREDS",
        hide_env_values = true,
        value_name = "USER:PASS",
        conflicts_with = "registry_token"
    )]
    pub creds: Option<String>,

    /// Token used directly as a bearer token
    #[arg(
        long,
        env = "IMGSPECT_REGISTRY_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub registry_token: Option<String>,

    /// Access the registry anonymously, ignoring any credentials
    #[arg(long)]
    pub no_creds: bool,

    /// Architecture to pick from multi-architecture images
    #[arg(long, value_name = "ARCH")]
    pub override_arch: Option<String>,

    /// OS to pick from multi-architecture images
    #[arg(long, value_name = "OS")]
    pub override_os: Option<String>,

    /// Architecture variant to pick from multi-architecture images
    #[arg(long, value_name = "VARIANT")]
    pub override_variant: Option<String>,

    /// Give up after this many seconds (0: never)
    #[arg(long, value_name = "SECS")]
    pub command_timeout: Option<u64>,

    /// Directory for temporary blob files
    #[arg(long, value_name = "DIR")]
    pub tmpdir: Option<Utf8PathBuf>,

    /// Contact this registry (host[:port]) over plain HTTP; repeatable
    #[arg(long, value_name = "HOST")]
    pub plain_http: Vec<String>,

    /// Also list every tag of the repository
    #[arg(long)]
    pub list_tags: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Lines)]
    pub format: OutputFormat,

    /// Print the manifest exactly as returned by the registry
    #[arg(long)]
    pub raw: bool,
}

impl InspectArgs {
    /// Flags as a config layer over file and environment settings
    fn config_overlay(&self) -> RuntimeConfig {
        let mut overlay = RuntimeConfig::default();
        overlay.network.command_timeout_secs = self.command_timeout;
        overlay.tls.verify = self.tls_verify;
        overlay.tls.cert_dir = self.cert_dir.clone();
        overlay.registries.plain_http = self.plain_http.clone();
        overlay.platform.architecture = self.override_arch.clone();
        overlay.platform.os = self.override_os.clone();
        overlay.platform.variant = self.override_variant.clone();
        overlay.staging.tmp_dir = self.tmpdir.clone();
        overlay
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        if self.no_creds {
            return Ok(None);
        }
        if let Some(token) = &self.registry_token {
            return Ok(Some(Credentials::Token(token.clone())));
        }
        Ok(self
            .creds
            .as_deref()
            .map(Credentials::parse_basic)
            .transpose()?)
    }
}

/// Run the inspection and print its result
pub async fn run(args: InspectArgs, config: Option<&Utf8Path>) -> Result<()> {
    let reference = ImageReference::parse(&args.image)?;

    let loader = match config {
        Some(path) => HierarchicalConfigLoader::with_file(path.to_path_buf()),
        None => HierarchicalConfigLoader::new()?,
    };
    let runtime = loader
        .load_runtime_config()
        .context("Failed to load configuration")?
        .merge(args.config_overlay());
    debug!("Effective configuration: {:?}", runtime);

    let ctx = ConnectionContext::from_runtime_config(&runtime).with_credentials(args.credentials()?);
    let options = InspectOptions {
        list_tags: args.list_tags,
        raw: args.raw,
        timeout: runtime.network.command_timeout(),
    };

    info!("Inspecting {}", reference);
    let inspection = inspect(&reference, Arc::new(ctx), &options)
        .await
        .with_context(|| format!("Failed to inspect {}", reference))?;

    // Render everything before touching stdout
    let rendered = render(&inspection, args.format)?;
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&rendered)
        .and_then(|()| stdout.flush())
        .context("Failed to write output")?;

    Ok(())
}

fn render(inspection: &Inspection, format: OutputFormat) -> Result<Vec<u8>> {
    let text = match inspection {
        Inspection::Raw(bytes) => return Ok(bytes.clone()),
        Inspection::Metadata(output) => match format {
            OutputFormat::Lines => output
                .label_lines()
                .into_iter()
                .map(|line| line + "\n")
                .collect::<String>(),
            OutputFormat::Json => output.to_json()? + "\n",
        },
    };
    Ok(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgspect_image::{Digest, ImageMetadata, InspectionOutput};
    use std::collections::BTreeMap;

    fn args(extra: &[&str]) -> InspectArgs {
        use clap::Parser;

        #[derive(Parser)]
        struct Harness {
            #[command(flatten)]
            args: InspectArgs,
        }

        let mut argv = vec!["imgspect"];
        argv.extend_from_slice(extra);
        argv.push("registry://example.com/repo:v1");
        Harness::try_parse_from(argv).unwrap().args
    }

    fn output() -> Inspection {
        let labels: BTreeMap<String, String> = [("maintainer", "a"), ("version", "1.0")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Inspection::Metadata(Box::new(InspectionOutput::new(
            Some("example.com/repo".to_string()),
            Vec::new(),
            ImageMetadata {
                tag: Some("v1".to_string()),
                digest: Digest::sha256(b"m"),
                created: None,
                docker_version: String::new(),
                labels,
                architecture: "amd64".to_string(),
                os: "linux".to_string(),
                variant: String::new(),
                layers: Vec::new(),
                env: Vec::new(),
            },
        )))
    }

    #[test]
    fn test_render_lines() {
        let rendered = render(&output(), OutputFormat::Lines).unwrap();
        assert_eq!(
            String::from_utf8(rendered).unwrap(),
            "Key: maintainer => Element: a\nKey: version => Element: 1.0\n"
        );
    }

    #[test]
    fn test_render_json() {
        let rendered = render(&output(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(value["Name"], "example.com/repo");
        assert_eq!(value["Labels"]["version"], "1.0");
    }

    #[test]
    fn test_render_raw_is_unchanged() {
        let raw = Inspection::Raw(b"{\"schemaVersion\":2}".to_vec());
        assert_eq!(
            render(&raw, OutputFormat::Json).unwrap(),
            b"{\"schemaVersion\":2}".to_vec()
        );
    }

    #[test]
    fn test_flags_override_config() {
        let args = args(&[
            "--tls-verify=false",
            "--command-timeout",
            "30",
            "--override-os",
            "windows",
        ]);

        let mut file_config = RuntimeConfig::default();
        file_config.tls.verify = Some(true);
        file_config.platform.architecture = Some("arm64".to_string());

        let merged = file_config.merge(args.config_overlay());
        assert_eq!(merged.tls.verify, Some(false));
        assert_eq!(merged.network.command_timeout_secs, Some(30));
        assert_eq!(merged.platform.os.as_deref(), Some("windows"));
        assert_eq!(merged.platform.architecture.as_deref(), Some("arm64"));
    }

    #[test]
    fn test_credentials_selection() {
        assert_eq!(
            args(&["--creds", "alice:pw"]).credentials().unwrap(),
            Some(Credentials::Basic {
                username: "alice".to_string(),
                password: "pw".to_string()
            })
        );
        assert_eq!(
            args(&["--registry-token", "tok"]).credentials().unwrap(),
            Some(Credentials::Token("tok".to_string()))
        );
        assert_eq!(
            args(&["--creds", "alice:pw", "--no-creds"]).credentials().unwrap(),
            None
        );
        assert!(args(&["--creds", "nocolon"]).credentials().is_err());
    }
}
