use crate::elevation::LaunchPlan;
use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus, OutputStream};
use crate::loader::LoaderDescriptor;
use crate::profile::Profile;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Starts installed loaders. The child is not awaited by the caller; its output and exit
/// code are reported on the event bus. Children run in their own process group so a
/// Ctrl+C aimed at the launcher does not reach the loader or the game.
#[derive(Clone)]
pub struct ProcessLauncher {
    events: EventBus,
}

impl ProcessLauncher {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    pub fn launch(&self, profile: &Profile, loader: &LoaderDescriptor) -> CoreResult<()> {
        let exe = profile.root.join(&loader.launcher_exe);
        if !exe.is_file() {
            return Err(CoreError::LoaderNotInstalled(exe));
        }
        info!("Launching {} for profile '{}'", exe.display(), profile.name);
        self.spawn(&profile.id, &LaunchPlan::elevated(&exe, &profile.root))
    }

    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, profile_id: &str, plan: &LaunchPlan) -> CoreResult<()> {
        let mut cmd = Command::new(&plan.program);
        cmd.args(&plan.args)
            .current_dir(&plan.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);

        let mut child = cmd.spawn().map_err(|e| CoreError::io(&plan.program, e))?;
        info!("Started {} (pid {:?})", plan.program.display(), child.id());

        let stdout = child.stdout.take().map(|s| forward_lines(s, OutputStream::Stdout, profile_id, &self.events));
        let stderr = child.stderr.take().map(|s| forward_lines(s, OutputStream::Stderr, profile_id, &self.events));
        let events = self.events.clone();
        let profile_id = profile_id.to_string();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Waiting on loader process failed: {}", e);
                    None
                }
            };
            // Drain the readers so every line is published before the exit event.
            for reader in [stdout, stderr].into_iter().flatten() {
                let _ = reader.await;
            }
            info!("Loader process for profile {} exited with {:?}", profile_id, code);
            events.emit(CoreEvent::ProcessExited { profile_id, code });
        });
        Ok(())
    }
}

fn forward_lines<R>(reader: R, stream: OutputStream, profile_id: &str, events: &EventBus) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let events = events.clone();
    let profile_id = profile_id.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match stream {
                OutputStream::Stdout => info!(target: "loader", "[{}] {}", profile_id, line),
                OutputStream::Stderr => warn!(target: "loader", "[{}] {}", profile_id, line),
            }
            events.emit(CoreEvent::ProcessOutput { profile_id: profile_id.clone(), stream, line });
        }
    })
}
