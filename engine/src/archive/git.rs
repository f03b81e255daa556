//! Git repositories cloned and zipped

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{local, ZipStream};
use crate::errors::EngineError;
use crate::http::logger::{redact_text, redact_url};

/// Reference cloned when the URL carries no fragment
pub const DEFAULT_REF: &str = "master";

const PASSPHRASE_ENV: &str = "CFDEPLOYER_GIT_PASSPHRASE";

static SCP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9_]+@)?([a-zA-Z0-9._-]+):(.*)$").expect("scp pattern is valid")
});

/// Clones share the temp area, one at a time
static GIT_LOCK: Mutex<()> = Mutex::const_new(());

/// Parsed git source reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSource {
    /// URL handed to git, without query, fragment or sub path
    pub url: String,
    /// Branch, tag or 40 character commit hash
    pub reference: String,
    /// Directory inside the repository to archive, empty for the root
    pub sub_path: String,
    pub private_key: Option<String>,
    pub passphrase: Option<String>,
    pub ssh: bool,
}

fn has_scheme(raw: &str) -> bool {
    raw.contains("://")
}

fn is_scp(raw: &str) -> bool {
    !has_scheme(raw) && SCP_RE.is_match(raw)
}

fn repo_path_is_git(path: &str) -> bool {
    path.ends_with(".git") || path.contains(".git/")
}

/// Whether `raw` designates a git repository: an http(s), ssh or scp-like URL whose path ends
/// in `.git` or continues past it into a sub path.
pub fn is_git_url(raw: &str) -> bool {
    let Ok(url) = to_url(raw) else {
        return false;
    };
    matches!(url.scheme(), "http" | "https" | "ssh") && repo_path_is_git(url.path())
}

/// URL form of `raw`, turning scp-like `user@host:path` into `ssh://user@host/path`
fn to_url(raw: &str) -> Result<Url, EngineError> {
    if is_scp(raw) {
        let captures = SCP_RE
            .captures(raw)
            .ok_or_else(|| EngineError::Git(format!("invalid git url {}", redact_url(raw))))?;
        let user = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let host = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        let path = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
        return Ok(Url::parse(&format!("ssh://{}{}/{}", user, host, path))?);
    }
    Ok(Url::parse(raw)?)
}

pub fn is_commit_hash(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

impl GitSource {
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let scp = is_scp(raw);
        let mut url = to_url(raw)?;

        let reference = url
            .fragment()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_REF)
            .to_string();
        url.set_fragment(None);

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let private_key = query.get("private-key").filter(|v| !v.is_empty()).cloned();
        let passphrase = query.get("password-key").filter(|v| !v.is_empty()).cloned();
        url.set_query(None);

        let mut sub_path = String::new();
        if let Some((repo, rest)) = url.path().split_once(".git/") {
            sub_path = rest.trim_matches('/').to_string();
            let repo = format!("{}.git", repo);
            url.set_path(&repo);
        }

        let ssh = url.scheme() == "ssh";
        let clone_url = if scp {
            let user = if url.username().is_empty() {
                String::new()
            } else {
                format!("{}@", url.username())
            };
            let host = url.host_str().unwrap_or_default();
            let path = url.path().strip_prefix('/').unwrap_or(url.path());
            format!("{}{}:{}", user, host, path)
        } else {
            url.to_string()
        };

        Ok(Self {
            url: clone_url,
            reference,
            sub_path,
            private_key,
            passphrase,
            ssh,
        })
    }

    /// Name of the repository, used to name the produced archive
    pub fn repo_name(&self) -> String {
        let base = crate::utils::basename(&self.url);
        let base = base.rsplit(':').next().unwrap_or(base);
        base.trim_end_matches(".git").to_string()
    }
}

/// Environment for a non-interactive git run with the source's credentials
fn git_env(source: &GitSource, askpass: Option<&Path>) -> Vec<(String, String)> {
    let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
    if source.ssh {
        if let Some(key) = &source.private_key {
            env.push((
                "GIT_SSH_COMMAND".to_string(),
                format!(
                    "ssh -i '{}' -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
                    key.replace('\'', "")
                ),
            ));
        } else {
            env.push((
                "GIT_SSH_COMMAND".to_string(),
                "ssh -o StrictHostKeyChecking=accept-new".to_string(),
            ));
        }
        if let (Some(passphrase), Some(script)) = (&source.passphrase, askpass) {
            env.push((PASSPHRASE_ENV.to_string(), passphrase.clone()));
            env.push(("SSH_ASKPASS".to_string(), script.to_string_lossy().into_owned()));
            env.push(("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()));
            env.push(("DISPLAY".to_string(), ":0".to_string()));
        }
    }
    env
}

/// Script answering the key passphrase prompt from the environment
fn write_askpass(dir: &Path) -> Result<PathBuf, EngineError> {
    let path = dir.join("askpass.sh");
    std::fs::write(&path, format!("#!/bin/sh\nprintf '%s\\n' \"${}\"\n", PASSPHRASE_ENV))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(path)
}

async fn run_git(
    args: &[&str],
    cwd: Option<&Path>,
    env: &[(String, String)],
) -> Result<String, EngineError> {
    let subcommand = args.first().copied().unwrap_or("git");
    let mut command = Command::new("git");
    command.args(args).envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command
        .output()
        .await
        .map_err(|e| EngineError::Git(format!("Failed to run git {}: {}", subcommand, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::Git(format!(
            "git {} failed: {}",
            subcommand,
            redact_text(stderr.trim())
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// git invocations cloning `source` into `target` at depth 1, with the directory each runs in.
///
/// Commits are fetched by hash into an empty repository, branches and tags are cloned directly.
fn clone_commands(source: &GitSource, target: &Path) -> Vec<(Vec<String>, Option<PathBuf>)> {
    let target_str = target.to_string_lossy().into_owned();
    let args = |list: &[&str]| list.iter().map(|a| a.to_string()).collect::<Vec<_>>();
    if is_commit_hash(&source.reference) {
        let inside = Some(target.to_path_buf());
        return vec![
            (args(&["init", "--quiet", &target_str]), None),
            (args(&["remote", "add", "origin", &source.url]), inside.clone()),
            (
                args(&["fetch", "--quiet", "--depth", "1", "origin", &source.reference]),
                inside.clone(),
            ),
            (args(&["checkout", "--quiet", "--force", "FETCH_HEAD"]), inside),
        ];
    }

    vec![(
        args(&[
            "clone",
            "--quiet",
            "--depth",
            "1",
            "--single-branch",
            "--branch",
            &source.reference,
            &source.url,
            &target_str,
        ]),
        None,
    )]
}

/// Clone `source` into `target`, checking out its reference
async fn clone(source: &GitSource, target: &Path, env: &[(String, String)]) -> Result<(), EngineError> {
    for (args, cwd) in clone_commands(source, target) {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_git(&args, cwd.as_deref(), env).await?;
    }
    Ok(())
}

/// Clone the repository at `raw` and zip its working tree (or sub path) without `.git`
pub async fn fetch(raw: &str) -> Result<ZipStream, EngineError> {
    let source = GitSource::parse(raw)?;
    let workdir = tempfile::Builder::new().prefix("cfdeployer-git").tempdir()?;
    let repo_dir = workdir.path().join("repo");

    {
        let _guard = GIT_LOCK.lock().await;
        info!(
            "Cloning {} at {}",
            redact_url(&source.url),
            source.reference
        );
        let askpass = match &source.passphrase {
            Some(_) if source.ssh => Some(write_askpass(workdir.path())?),
            _ => None,
        };
        let env = git_env(&source, askpass.as_deref());
        clone(&source, &repo_dir, &env).await?;
    }

    tokio::fs::remove_dir_all(repo_dir.join(".git")).await?;

    let archive_root = if source.sub_path.is_empty() {
        repo_dir.clone()
    } else {
        repo_dir.join(&source.sub_path)
    };
    if !archive_root.starts_with(&repo_dir) || !archive_root.is_dir() {
        return Err(EngineError::Git(format!(
            "sub path '{}' not found in repository",
            source.sub_path
        )));
    }

    let name = source.repo_name();
    debug!("Zipping {} from {}", name, archive_root.display());
    let zipped = tokio::task::spawn_blocking(move || local::zip_dir(&archive_root))
        .await
        .map_err(|e| EngineError::Internal(format!("archive task failed: {}", e)))??;
    drop(workdir);
    ZipStream::from_temp(zipped, &name)
}

/// Commit the source's reference points to, without cloning
pub async fn commit_hash(raw: &str) -> Result<String, EngineError> {
    let source = GitSource::parse(raw)?;
    if is_commit_hash(&source.reference) {
        return Ok(source.reference);
    }

    let workdir = tempfile::Builder::new().prefix("cfdeployer-git").tempdir()?;
    let askpass = match &source.passphrase {
        Some(_) if source.ssh => Some(write_askpass(workdir.path())?),
        _ => None,
    };
    let env = git_env(&source, askpass.as_deref());
    let heads = format!("refs/heads/{}", source.reference);
    let tags = format!("refs/tags/{}", source.reference);
    let listing = run_git(&["ls-remote", &source.url, &heads, &tags], None, &env).await?;

    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .next()
        .map(str::to_string)
        .ok_or_else(|| {
            EngineError::Git(format!(
                "couldn't find remote ref {} in {}",
                source.reference,
                redact_url(&source.url)
            ))
        })
}
