//! Device step-up approval.
//!
//! When the rule matching a call needs approval, the engine sends a
//! one-time passcode to the user's most recently registered device and
//! holds the call until the user decides, the passcode expires, or the
//! request is cancelled. The waiting side is the only writer of `used`;
//! the deciding side ([`AuthService::approve_token`]) only writes
//! `approved`, and only while the passcode is still pending.

use log::{debug, info, warn};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use super::AuthService;
use crate::app::App;
use crate::context::RequestContext;
use crate::device::{ApprovalRequest, Notification};
use crate::error::{Collaborator, Error, Result};
use crate::session::{now_unix, OtpState, Session, SessionDeviceOtp};
use crate::store::StoreError;

/// Why the approval wait stopped.
#[derive(Debug)]
enum WaitOutcome {
    Approved,
    Denied,
    Expired,
    AlreadyUsed,
    Missing,
    TimedOut,
    Cancelled,
    ReadFailed(StoreError),
}

fn not_approved() -> Error {
    Error::Unauthorized("the user did not approve the invocation".into())
}

impl AuthService {
    /// Ask the session's user to approve the call and wait for the answer.
    pub(super) async fn step_up(
        &self,
        ctx: &RequestContext,
        session: &Session,
        caller: &App,
        callee: &App,
        tool_name: &str,
    ) -> Result<()> {
        let user_id = session
            .user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                Error::ValidationFailed(format!(
                    "session {} has no user to ask for approval",
                    session.id
                ))
            })?;

        let device = self
            .devices
            .devices_for_user(user_id)
            .await
            .map_err(Error::repository("load devices", user_id))?
            .into_iter()
            .max_by_key(|device| device.created_at)
            .ok_or_else(|| {
                Error::ValidationFailed(
                    "no user devices registered, unable to ask for approval".into(),
                )
            })?;

        let otp = self
            .sessions
            .create_device_otp(SessionDeviceOtp::new(
                &session.id,
                &device.id,
                self.config.otp_validity,
            ))
            .await
            .map_err(Error::repository("create device OTP", &session.id))?;
        debug!(
            "Created OTP {} for session {} on device {}",
            otp.id, session.id, device.id
        );

        let notification = Notification::approval_request(ApprovalRequest {
            caller_app: caller.display_name().to_string(),
            callee_app: callee.display_name().to_string(),
            tool_name: Some(tool_name.to_string()).filter(|name| !name.is_empty()),
            otp: otp.value.clone(),
            device_id: device.id.clone(),
            session_id: session.id.clone(),
            timeout_in_seconds: self.config.otp_validity.as_secs_f64().ceil() as u64,
        });

        if let Err(err) = self.notifier.send(&device, notification).await {
            if let Err(consume) = self.sessions.consume_device_otp(&otp.id, now_unix()).await {
                warn!("Failed to retire undelivered OTP {}: {}", otp.id, consume);
            }
            return Err(Error::upstream(
                Collaborator::Notifier,
                "send approval request",
                &device.id,
                err,
            ));
        }

        self.wait_for_device_approval(ctx, &otp.id).await
    }

    /// Poll the OTP until a terminal state, the validity window elapses or
    /// the request is cancelled, then mark it used.
    async fn wait_for_device_approval(&self, ctx: &RequestContext, otp_id: &str) -> Result<()> {
        let period = self.config.otp_poll_interval;
        let deadline = Instant::now() + self.config.otp_validity;
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel = ctx.cancellation();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break WaitOutcome::Cancelled,
                _ = sleep_until(deadline) => break WaitOutcome::TimedOut,
                _ = ticks.tick() => {
                    match self.sessions.device_otp(otp_id).await {
                        Err(err) => break WaitOutcome::ReadFailed(err),
                        Ok(None) => break WaitOutcome::Missing,
                        Ok(Some(otp)) => {
                            match otp.state_at(now_unix(), self.config.otp_expiry_tolerance) {
                                OtpState::Pending => {}
                                OtpState::Approved => break WaitOutcome::Approved,
                                OtpState::Denied => break WaitOutcome::Denied,
                                OtpState::Expired => break WaitOutcome::Expired,
                                OtpState::Used => break WaitOutcome::AlreadyUsed,
                            }
                        }
                    }
                }
            }
        };

        let consumption = self
            .sessions
            .consume_device_otp(otp_id, now_unix())
            .await
            .map_err(Error::repository("flag device OTP as used", otp_id))?;

        // A decision stored before the OTP was consumed stands.
        let approved = consumption.consumed && consumption.otp.is_approved();

        match outcome {
            WaitOutcome::Cancelled => {
                debug!("Approval wait for OTP {} cancelled", otp_id);
                Err(Error::Cancelled(
                    "the request was cancelled while waiting for approval".into(),
                ))
            }
            WaitOutcome::ReadFailed(err) => {
                Err(Error::repository("load device OTP", otp_id)(err))
            }
            WaitOutcome::Approved | WaitOutcome::TimedOut if approved => {
                debug!("OTP {} approved", otp_id);
                Ok(())
            }
            WaitOutcome::TimedOut => {
                info!("Approval wait for OTP {} timed out", otp_id);
                Err(not_approved())
            }
            other => {
                debug!("OTP {} not approved: {:?}", otp_id, other);
                Err(not_approved())
            }
        }
    }

    /// Record the user's decision on a pending OTP.
    ///
    /// Fails with [`Error::NotFound`] for an unknown OTP, [`Error::Expired`]
    /// past its validity and [`Error::Conflict`] once it has been decided or
    /// consumed.
    pub async fn approve_token(
        &self,
        device_id: &str,
        session_id: &str,
        otp_value: &str,
        approve: bool,
    ) -> Result<()> {
        if device_id.is_empty() || session_id.is_empty() || otp_value.is_empty() {
            return Err(Error::ValidationFailed(
                "the device id, session id and OTP value are required".into(),
            ));
        }

        let otp = self
            .sessions
            .device_otp_by_value(device_id, session_id, otp_value)
            .await
            .map_err(Error::repository("load device OTP", device_id))?
            .ok_or_else(|| Error::NotFound("device OTP not found".into()))?;

        let now = now_unix();
        if otp.has_expired_at(now, self.config.otp_expiry_tolerance) {
            return Err(Error::Expired(format!("device OTP {} has expired", otp.id)));
        }
        if otp.used || otp.is_decided() {
            return Err(Error::Conflict(format!(
                "device OTP {} is already used",
                otp.id
            )));
        }

        let recorded = self
            .sessions
            .decide_device_otp(&otp.id, approve, now)
            .await
            .map_err(Error::repository("record OTP decision", &otp.id))?;
        if !recorded {
            return Err(Error::Conflict(format!(
                "device OTP {} is already used",
                otp.id
            )));
        }

        debug!(
            "Recorded decision on OTP {} (approved: {})",
            otp.id, approve
        );
        Ok(())
    }
}
