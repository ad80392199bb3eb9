//! Capture Loop
//!
//! Grabs frames on the calling thread at the camera's native rate,
//! applying pending control commands before every grab.

use camera_device::{CameraDevice, CancellationToken, DeviceError, Frame, View};
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::{debug, error, info, warn};

use crate::controls::{CameraControls, ControlCommand, ControlOutcome};
use crate::settings::GrabFailurePolicy;

/// Why the capture loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Cancellation requested (signal or quit command)
    Cancelled,
    /// A grab failed under the abort policy
    GrabFailed(DeviceError),
}

/// Counters collected by the capture loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub grabbed: u64,
    pub grab_failures: u64,
    pub commands_applied: u64,
    pub command_failures: u64,
}

/// Frame acquisition loop over a shared device
pub struct CaptureLoop<'a, D: CameraDevice> {
    device: &'a D,
    policy: GrabFailurePolicy,
    token: CancellationToken,
    controls: CameraControls,
    commands: Option<Receiver<ControlCommand>>,
    stats: CaptureStats,
}

impl<'a, D: CameraDevice> CaptureLoop<'a, D> {
    /// Create a loop without a control source
    pub fn new(device: &'a D, policy: GrabFailurePolicy, token: CancellationToken) -> Self {
        Self {
            device,
            policy,
            token,
            controls: CameraControls::new(),
            commands: None,
            stats: CaptureStats::default(),
        }
    }

    /// Receive control commands from `commands`
    pub fn with_commands(mut self, commands: Receiver<ControlCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Grab one frame and retrieve its left image
    pub fn grab_frame(&self) -> Result<Frame, DeviceError> {
        self.device.grab()?;
        self.device.retrieve_image(View::Left)
    }

    /// Counters so far
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Run until cancelled, or until a grab fails under the abort policy.
    ///
    /// `on_frame` sees every frame; it must not hold on to it.
    pub fn run(&mut self, mut on_frame: impl FnMut(&Frame)) -> StopReason {
        info!("Capture loop started ({:?} on grab failure)", self.policy);

        let reason = loop {
            if self.token.is_cancelled() {
                break StopReason::Cancelled;
            }

            self.apply_pending_commands();
            if self.token.is_cancelled() {
                break StopReason::Cancelled;
            }

            match self.grab_frame() {
                Ok(frame) => {
                    self.stats.grabbed += 1;
                    on_frame(&frame);
                }
                Err(e) => {
                    self.stats.grab_failures += 1;
                    match self.policy {
                        GrabFailurePolicy::Abort => {
                            error!("Error during capture: {}", e);
                            break StopReason::GrabFailed(e);
                        }
                        GrabFailurePolicy::Continue => {
                            warn!(
                                "Error during capture ({} so far), continuing: {}",
                                self.stats.grab_failures, e
                            );
                        }
                    }
                }
            }
        };

        info!(
            "Capture loop stopped: {} frames, {} grab failures",
            self.stats.grabbed, self.stats.grab_failures
        );
        reason
    }

    fn apply_pending_commands(&mut self) {
        let Some(commands) = self.commands.as_ref() else {
            return;
        };

        let mut disconnected = false;
        let mut pending = Vec::new();
        loop {
            match commands.try_recv() {
                Ok(command) => pending.push(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            debug!("Control source closed");
            self.commands = None;
        }

        for command in pending {
            match self.controls.apply(self.device, command) {
                Ok(ControlOutcome::Applied) => self.stats.commands_applied += 1,
                Ok(ControlOutcome::Quit) => {
                    info!("Quit requested");
                    self.stats.commands_applied += 1;
                    self.token.cancel();
                    return;
                }
                Err(e) => {
                    self.stats.command_failures += 1;
                    warn!("Control command {:?} failed: {}", command, e);
                }
            }
        }
    }
}
