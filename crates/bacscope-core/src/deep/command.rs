use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::config::DeepDecoderConfig;

use super::error::DeepDecodeError;

pub const DEFAULT_TOOL: &str = "tshark";
pub const DEFAULT_DISPLAY_FILTER: &str = "bacnet || bvlc || bacapp";

/// Field extractors requested by default, in output column order.
pub const DEFAULT_FIELDS: &[&str] = &[
    "frame.number",
    "frame.time_epoch",
    "frame.len",
    "eth.src",
    "eth.dst",
    "ip.src",
    "ip.dst",
    "ipv6.src",
    "ipv6.dst",
    "ip.ttl",
    "udp.srcport",
    "udp.dstport",
    "bvlc.function",
    "bacnet.control",
    "bacapp.type",
    "bacapp.confirmed_service",
    "bacapp.unconfirmed_service",
    "bacapp.invoke_id",
    "bacapp.objectType",
    "bacapp.instance_number",
    "bacapp.vendor_identifier",
    "_ws.col.Info",
];

/// Command line of one deep decoder run: read `capture`, keep frames
/// matching the filter, print one tab-separated line per frame with the
/// requested fields.
#[derive(Debug, Clone)]
pub struct DecoderCommand {
    tool: String,
    args: Vec<OsString>,
}

impl DecoderCommand {
    pub fn new(config: &DeepDecoderConfig, capture: &Path) -> Self {
        let mut args: Vec<OsString> = vec![
            "-n".into(),
            "-r".into(),
            capture.as_os_str().to_owned(),
            "-Y".into(),
            config.display_filter.clone().into(),
            "-T".into(),
            "fields".into(),
        ];
        for option in [
            "header=n",
            "separator=/t",
            "quote=n",
            "occurrence=f",
        ] {
            args.push("-E".into());
            args.push(option.into());
        }
        for field in &config.fields {
            args.push("-e".into());
            args.push(field.into());
        }
        Self {
            tool: config.tool.clone(),
            args,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Start the decoder with stdout and stderr piped.
    ///
    /// # Errors
    /// `ToolUnavailable` when the executable cannot be found or run,
    /// `Spawn` for any other start failure.
    pub fn spawn(&self) -> Result<Child, DeepDecodeError> {
        Command::new(&self.tool)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    DeepDecodeError::ToolUnavailable {
                        tool: self.tool.clone(),
                        source,
                    }
                }
                _ => DeepDecodeError::Spawn {
                    tool: self.tool.clone(),
                    source,
                },
            })
    }
}
