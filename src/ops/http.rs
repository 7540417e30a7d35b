#![allow(async_fn_in_trait)]

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncWriteExt as _;
use tokio::process::Command;

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built request: absolute URL, every header, optional raw body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// -----------------------------------------------------------------------------
// HttpOps trait

/// Executes one request/response exchange.
///
/// Returns `Err` only when the exchange itself failed (connection refused,
/// DNS, TLS, the transport process dying). Any HTTP status, including 4xx and
/// 5xx, is an `Ok` response for the caller to classify.
#[cfg_attr(test, automock)]
pub trait HttpOps {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

// -----------------------------------------------------------------------------
// RealHttp

/// Executor that runs each request through curl
///
/// Headers travel in a config file readable only by the current user, so the
/// bearer token never shows up in the process list.
pub struct RealHttp;

impl HttpOps for RealHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let config = tempfile::NamedTempFile::new().context("Failed to create curl config file")?;
        tokio::fs::write(config.path(), curl_config(&request.headers))
            .await
            .context("Failed to write curl config file")?;

        let mut child = Command::new("curl")
            .args(curl_args(&request, config.path()))
            .stdin(if request.body.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to execute curl command")?;

        if let Some(body) = &request.body {
            let mut stdin = child.stdin.take().context("curl stdin unavailable")?;
            stdin
                .write_all(body)
                .await
                .context("Failed to write request body to curl")?;
            // Closing stdin ends the upload
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to wait for curl command")?;

        if !output.status.success() {
            bail!(
                "curl command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        parse_response(output.stdout)
    }
}

fn curl_args(request: &HttpRequest, config: &Path) -> Vec<String> {
    let mut args = vec![
        "-sS".to_string(),
        "-K".to_string(),
        config.display().to_string(),
        "-X".to_string(),
        request.method.to_string(),
        "-w".to_string(),
        "\n%{http_code}".to_string(),
    ];
    if request.body.is_some() {
        args.push("--data-binary".to_string());
        args.push("@-".to_string());
    }
    args.push(request.url.clone());
    args
}

/// One `header = "Name: value"` line per header, quoted for curl's config
/// syntax.
fn curl_config(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let line = format!("{}: {}", name, value)
                .replace('\\', "\\\\")
                .replace('"', "\\\"");
            format!("header = \"{}\"\n", line)
        })
        .collect()
}

/// Split curl output into body and the status line appended by `-w`.
fn parse_response(mut stdout: Vec<u8>) -> Result<HttpResponse> {
    let split = stdout
        .iter()
        .rposition(|b| *b == b'\n')
        .context("curl output is missing the status line")?;
    let status_line = String::from_utf8_lossy(&stdout[split + 1..]).trim().to_string();
    let status = status_line
        .parse::<u16>()
        .with_context(|| format!("Invalid status code from curl: {:?}", status_line))?;
    if status == 0 {
        bail!("curl reported no HTTP response");
    }

    stdout.truncate(split);
    Ok(HttpResponse {
        status,
        body: stdout,
    })
}
