//! ---
//! gsn_section: "05-launch-artifacts"
//! gsn_subsection: "module"
//! gsn_type: "source"
//! gsn_scope: "code"
//! gsn_description: "Launch artifact synthesis and reverse parsing."
//! gsn_version: "v0.1.0"
//! gsn_owner: "tbd"
//! ---
//! Stop artifact pair.
//!
//! Several same-named server processes run concurrently on one host, so
//! the terminate script cannot kill by executable name alone: it
//! enumerates candidates by name, then inspects each process's command
//! line and signals only the one carrying this server's session token.

use std::path::{Path, PathBuf};

use garrison_common::paths;
use tokio::fs;
use tracing::info;

use crate::Result;

fn render_filter_script(server_name: &str) -> String {
    format!(
        r#"#!/bin/sh
# Terminate the one server process whose arguments carry this session token.
TOKEN='SessionName={server_name}'
for pid in $(pgrep -f '{binary}'); do
    if tr '\0' ' ' < "/proc/$pid/cmdline" | grep -qF "$TOKEN"; then
        kill "$pid"
    fi
done
"#,
        binary = paths::SERVER_BINARY_NAME,
    )
}

fn render_wrapper_script() -> String {
    format!(
        "#!/bin/sh\nexec \"$(dirname \"$0\")/{}\"\n",
        paths::STOP_FILTER_SCRIPT_NAME
    )
}

/// Write the stop artifact pair into the server directory.
///
/// Returns `(wrapper, filter)` paths.
pub async fn write_stop_scripts(server_dir: &Path, server_name: &str) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(server_dir).await?;

    let filter = server_dir.join(paths::STOP_FILTER_SCRIPT_NAME);
    fs::write(&filter, render_filter_script(server_name)).await?;
    make_executable(&filter).await?;

    let wrapper = server_dir.join(paths::STOP_SCRIPT_NAME);
    fs::write(&wrapper, render_wrapper_script()).await?;
    make_executable(&wrapper).await?;

    info!(server = %server_name, path = %wrapper.display(), "stop artifacts written");
    Ok((wrapper, filter))
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).await?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
