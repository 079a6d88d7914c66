use std::process::Stdio;
use std::thread;
use std::time::Duration;

use tokio::process::Command;
use tokio::time;
use tracing::{trace, warn};

const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Force-removes a container, killing every process inside it.
pub async fn remove_container(docker: &str, name: &str) {
    let task = Command::new(docker)
        .args(&["rm", "--force", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match time::timeout(REMOVE_TIMEOUT, task).await {
        Ok(result) => trace!("remove container = {}, result = {:?}", name, result),
        Err(_) => warn!(container = name, "timed out removing container"),
    }
}

/// Same as [`remove_container`] but usable where awaiting is impossible,
/// e.g. while a run future is being dropped.
pub fn remove_detached(docker: &str, name: &str) {
    let spawned = std::process::Command::new(docker)
        .args(&["rm", "--force", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            trace!("detached removal of container = {}", name);
            thread::spawn(move || {
                let _ = child.wait();
            });
        }
        Err(err) => warn!(container = name, %err, "failed to remove container"),
    }
}
