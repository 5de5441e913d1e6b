//! Call state machine.
//!
//! Drives exactly one call at a time through
//! `Idle -> OutgoingRinging/IncomingRinging -> Connecting -> Connected ->
//! Ended`.  Every media or negotiation failure tears the session down
//! completely: local tracks stopped, peer closed, state reset.  No path
//! leaves a dangling session behind.

use tracing::{debug, info, warn};
use uuid::Uuid;

use causerie_shared::protocol::{CallKind, CallSignal, CallSignalKind};

use crate::error::CallError;
use crate::session::{
    MediaProvider, MediaStream, PeerConnectionState, PeerSession, SignalSender,
};

/// Lifecycle of the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    /// We sent an offer and wait for the answer.
    OutgoingRinging,
    /// We received an offer and wait for the user to accept or reject.
    IncomingRinging,
    /// Negotiation done, waiting for the first remote track.
    Connecting,
    Connected,
    /// Torn down.  Equivalent to `Idle` for starting the next call.
    Ended,
}

impl CallState {
    /// True while a call occupies the coordinator.
    pub fn is_active(self) -> bool {
        !matches!(self, CallState::Idle | CallState::Ended)
    }
}

struct ActiveCall {
    call_id: String,
    kind: CallKind,
    remote_user: i64,
    peer: Box<dyn PeerSession>,
    local: Box<dyn MediaStream>,
}

/// Coordinates one call's signaling and media lifecycle.
pub struct CallCoordinator {
    local_user: i64,
    provider: Box<dyn MediaProvider>,
    signals: Box<dyn SignalSender>,
    state: CallState,
    call: Option<ActiveCall>,
    /// Offer held while ringing, before the user accepts.
    pending_offer: Option<CallSignal>,
}

impl CallCoordinator {
    pub fn new(
        local_user: i64,
        provider: Box<dyn MediaProvider>,
        signals: Box<dyn SignalSender>,
    ) -> Self {
        Self {
            local_user,
            provider,
            signals,
            state: CallState::Idle,
            call: None,
            pending_offer: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Id of the call currently occupying the coordinator, if any.
    pub fn current_call_id(&self) -> Option<&str> {
        self.call
            .as_ref()
            .map(|c| c.call_id.as_str())
            .or_else(|| self.pending_offer.as_ref().map(|o| o.call_id.as_str()))
    }

    /// Place an outbound call: acquire media, create the offer and publish
    /// it.  Returns the generated call id.
    pub async fn start_call(
        &mut self,
        receiver_id: i64,
        kind: CallKind,
    ) -> Result<String, CallError> {
        if self.state.is_active() {
            return Err(CallError::CallInProgress);
        }

        let parts = self.provider.open_session(kind).await?;
        let call_id = Uuid::new_v4().to_string();
        let mut call = ActiveCall {
            call_id: call_id.clone(),
            kind,
            remote_user: receiver_id,
            peer: parts.peer,
            local: parts.local,
        };

        let sdp = match call.peer.create_offer().await {
            Ok(sdp) => sdp,
            Err(e) => {
                warn!(call = %call_id, error = %e, "failed to create offer");
                release(&mut call);
                self.state = CallState::Ended;
                return Err(e);
            }
        };

        self.signals.send_offer(&CallSignal {
            call_id: call_id.clone(),
            kind: CallSignalKind::Offer,
            caller_id: self.local_user,
            receiver_id,
            call_type: kind,
            sdp: Some(sdp),
            candidate: None,
        });

        info!(call = %call_id, receiver = receiver_id, "outgoing call ringing");
        self.call = Some(call);
        self.state = CallState::OutgoingRinging;
        Ok(call_id)
    }

    /// Inbound offer.  Rings if idle; a second offer while busy is dropped.
    pub fn handle_offer(&mut self, signal: CallSignal) {
        if self.state.is_active() {
            warn!(call = %signal.call_id, "offer received while busy, ignoring");
            return;
        }
        if signal.sdp.is_none() {
            warn!(call = %signal.call_id, "offer without sdp, ignoring");
            return;
        }

        info!(call = %signal.call_id, caller = signal.caller_id, "incoming call ringing");
        self.pending_offer = Some(signal);
        self.state = CallState::IncomingRinging;
    }

    /// Accept the ringing inbound call: acquire media, apply the remote
    /// offer and publish the answer.
    pub async fn accept_call(&mut self) -> Result<(), CallError> {
        let offer = match (self.state, self.pending_offer.take()) {
            (CallState::IncomingRinging, Some(offer)) => offer,
            _ => return Err(CallError::NoActiveCall),
        };

        let parts = match self.provider.open_session(offer.call_type).await {
            Ok(parts) => parts,
            Err(e) => {
                warn!(call = %offer.call_id, error = %e, "failed to open media for accept");
                self.send_end_for(&offer.call_id, offer.caller_id, offer.call_type);
                self.state = CallState::Ended;
                return Err(e);
            }
        };
        let mut call = ActiveCall {
            call_id: offer.call_id.clone(),
            kind: offer.call_type,
            remote_user: offer.caller_id,
            peer: parts.peer,
            local: parts.local,
        };

        let sdp = offer.sdp.as_deref().unwrap_or_default();
        let answer = async {
            call.peer.set_remote_description(sdp).await?;
            call.peer.create_answer().await
        }
        .await;
        let answer = match answer {
            Ok(answer) => answer,
            Err(e) => {
                warn!(call = %offer.call_id, error = %e, "failed to answer call");
                release(&mut call);
                self.send_end_for(&offer.call_id, offer.caller_id, offer.call_type);
                self.state = CallState::Ended;
                return Err(e);
            }
        };

        self.signals.send_answer(&CallSignal {
            call_id: offer.call_id.clone(),
            kind: CallSignalKind::Answer,
            caller_id: self.local_user,
            receiver_id: offer.caller_id,
            call_type: offer.call_type,
            sdp: Some(answer),
            candidate: None,
        });

        info!(call = %offer.call_id, "call accepted, connecting");
        self.call = Some(call);
        self.state = CallState::Connecting;
        Ok(())
    }

    /// Reject the ringing inbound call without acquiring media.
    pub fn reject_call(&mut self) {
        let Some(offer) = self.pending_offer.take() else {
            return;
        };
        info!(call = %offer.call_id, "call rejected");
        self.send_end_for(&offer.call_id, offer.caller_id, offer.call_type);
        self.state = CallState::Ended;
    }

    /// Remote answer for our outgoing call.
    pub async fn handle_answer(&mut self, signal: CallSignal) {
        if self.state != CallState::OutgoingRinging || !self.is_current(&signal.call_id) {
            warn!(call = %signal.call_id, "unexpected answer, ignoring");
            return;
        }
        let Some(sdp) = signal.sdp.as_deref() else {
            warn!(call = %signal.call_id, "answer without sdp, ignoring");
            return;
        };

        let Some(call) = self.call.as_mut() else {
            return;
        };
        if let Err(e) = call.peer.set_remote_description(sdp).await {
            warn!(call = %signal.call_id, error = %e, "failed to apply answer");
            self.end_call();
            return;
        }

        debug!(call = %signal.call_id, "answer applied, connecting");
        self.state = CallState::Connecting;
    }

    /// Remote ICE candidate.  Failures are logged, never fatal.
    pub async fn handle_candidate(&mut self, signal: CallSignal) {
        if !self.is_current(&signal.call_id) {
            debug!(call = %signal.call_id, "candidate for unknown call, dropping");
            return;
        }
        let Some(candidate) = signal.candidate.as_deref() else {
            return;
        };
        let Some(call) = self.call.as_mut() else {
            // Still ringing; no peer to feed yet.
            return;
        };
        if let Err(e) = call.peer.add_ice_candidate(candidate).await {
            warn!(call = %signal.call_id, error = %e, "failed to add ICE candidate");
        }
    }

    /// Local ICE candidate from the media engine, forwarded to the peer.
    pub fn handle_local_candidate(&self, candidate: &str) {
        let Some(call) = self.call.as_ref() else {
            return;
        };
        self.signals.send_candidate(&CallSignal {
            call_id: call.call_id.clone(),
            kind: CallSignalKind::Candidate,
            caller_id: self.local_user,
            receiver_id: call.remote_user,
            call_type: call.kind,
            sdp: None,
            candidate: Some(candidate.to_owned()),
        });
    }

    /// First remote track arrived: the call is established.
    pub fn handle_remote_track(&mut self) {
        if self.state == CallState::Connecting {
            info!("call connected");
            self.state = CallState::Connected;
        }
    }

    /// Remote hangup.
    pub fn handle_remote_end(&mut self, signal: &CallSignal) {
        if !self.is_current(&signal.call_id) {
            return;
        }
        info!(call = %signal.call_id, "remote ended the call");
        self.pending_offer = None;
        self.cleanup();
    }

    /// Media engine reported a transport state change.  Terminal states
    /// force teardown without an end signal: the peer is already gone.
    pub fn handle_connection_state(&mut self, state: PeerConnectionState) {
        if state.is_terminal() && self.state.is_active() {
            warn!(?state, "peer connection lost, ending call");
            self.pending_offer = None;
            self.cleanup();
        }
    }

    /// Hang up locally: notify the peer, then tear down.  Idempotent.
    pub fn end_call(&mut self) {
        if let Some(offer) = self.pending_offer.take() {
            self.send_end_for(&offer.call_id, offer.caller_id, offer.call_type);
            self.state = CallState::Ended;
            return;
        }
        if let Some(call) = self.call.as_ref() {
            self.send_end_for(&call.call_id, call.remote_user, call.kind);
        }
        if self.state.is_active() {
            self.cleanup();
        }
    }

    /// Toggle the microphone.  Returns whether the call is now muted.
    pub fn toggle_mute(&mut self) -> bool {
        let Some(call) = self.call.as_mut() else {
            return false;
        };
        let enabled = !call.local.audio_enabled();
        call.local.set_audio_enabled(enabled);
        debug!(muted = !enabled, "microphone toggled");
        !enabled
    }

    /// Toggle the camera.  Returns whether the camera is now off.
    pub fn toggle_camera(&mut self) -> bool {
        let Some(call) = self.call.as_mut() else {
            return false;
        };
        let enabled = !call.local.video_enabled();
        call.local.set_video_enabled(enabled);
        debug!(camera_off = !enabled, "camera toggled");
        !enabled
    }

    pub fn switch_camera(&mut self) {
        if let Some(call) = self.call.as_mut() {
            call.local.switch_camera();
        }
    }

    fn is_current(&self, call_id: &str) -> bool {
        self.current_call_id() == Some(call_id)
    }

    fn send_end_for(&self, call_id: &str, remote_user: i64, kind: CallKind) {
        self.signals
            .send_end(&CallSignal::end(call_id, self.local_user, remote_user, kind));
    }

    fn cleanup(&mut self) {
        if let Some(mut call) = self.call.take() {
            release(&mut call);
        }
        self.state = CallState::Ended;
    }
}

fn release(call: &mut ActiveCall) {
    call.local.stop();
    call.peer.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionParts;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct FakePeer {
        closed: Arc<AtomicBool>,
        remote_sdp: Arc<Mutex<Option<String>>>,
        candidates: Arc<Mutex<Vec<String>>>,
        fail_negotiation: bool,
    }

    #[async_trait]
    impl PeerSession for FakePeer {
        async fn create_offer(&mut self) -> Result<String, CallError> {
            if self.fail_negotiation {
                return Err(CallError::Negotiation("offer failed".into()));
            }
            Ok("offer-sdp".into())
        }

        async fn create_answer(&mut self) -> Result<String, CallError> {
            if self.fail_negotiation {
                return Err(CallError::Negotiation("answer failed".into()));
            }
            Ok("answer-sdp".into())
        }

        async fn set_remote_description(&mut self, sdp: &str) -> Result<(), CallError> {
            *self.remote_sdp.lock().unwrap() = Some(sdp.to_owned());
            Ok(())
        }

        async fn add_ice_candidate(&mut self, candidate: &str) -> Result<(), CallError> {
            self.candidates.lock().unwrap().push(candidate.to_owned());
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct FakeStream {
        stopped: Arc<AtomicBool>,
        audio: bool,
        video: bool,
    }

    impl MediaStream for FakeStream {
        fn set_audio_enabled(&mut self, enabled: bool) {
            self.audio = enabled;
        }
        fn set_video_enabled(&mut self, enabled: bool) {
            self.video = enabled;
        }
        fn audio_enabled(&self) -> bool {
            self.audio
        }
        fn video_enabled(&self) -> bool {
            self.video
        }
        fn switch_camera(&mut self) {}
        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        fail: bool,
        fail_negotiation: bool,
        stopped: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
        remote_sdp: Arc<Mutex<Option<String>>>,
        candidates: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MediaProvider for FakeProvider {
        async fn open_session(&self, _kind: CallKind) -> Result<SessionParts, CallError> {
            if self.fail {
                return Err(CallError::Media("no camera".into()));
            }
            Ok(SessionParts {
                peer: Box::new(FakePeer {
                    closed: self.closed.clone(),
                    remote_sdp: self.remote_sdp.clone(),
                    candidates: self.candidates.clone(),
                    fail_negotiation: self.fail_negotiation,
                }),
                local: Box::new(FakeStream {
                    stopped: self.stopped.clone(),
                    audio: true,
                    video: true,
                }),
            })
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSignals {
        sent: Arc<Mutex<Vec<CallSignal>>>,
    }

    impl RecordingSignals {
        fn kinds(&self) -> Vec<CallSignalKind> {
            self.sent.lock().unwrap().iter().map(|s| s.kind).collect()
        }
    }

    impl SignalSender for RecordingSignals {
        fn send_offer(&self, signal: &CallSignal) {
            self.sent.lock().unwrap().push(signal.clone());
        }
        fn send_answer(&self, signal: &CallSignal) {
            self.sent.lock().unwrap().push(signal.clone());
        }
        fn send_candidate(&self, signal: &CallSignal) {
            self.sent.lock().unwrap().push(signal.clone());
        }
        fn send_end(&self, signal: &CallSignal) {
            self.sent.lock().unwrap().push(signal.clone());
        }
    }

    fn coordinator(provider: FakeProvider) -> (CallCoordinator, RecordingSignals) {
        let signals = RecordingSignals::default();
        let coordinator = CallCoordinator::new(1, Box::new(provider), Box::new(signals.clone()));
        (coordinator, signals)
    }

    fn offer_from(caller_id: i64, call_id: &str) -> CallSignal {
        CallSignal {
            call_id: call_id.into(),
            kind: CallSignalKind::Offer,
            caller_id,
            receiver_id: 1,
            call_type: CallKind::Video,
            sdp: Some("remote-offer".into()),
            candidate: None,
        }
    }

    #[tokio::test]
    async fn outgoing_call_publishes_offer_and_rings() {
        let (mut coordinator, signals) = coordinator(FakeProvider::default());

        let call_id = coordinator.start_call(2, CallKind::Video).await.unwrap();

        assert_eq!(coordinator.state(), CallState::OutgoingRinging);
        assert_eq!(coordinator.current_call_id(), Some(call_id.as_str()));
        let sent = signals.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, CallSignalKind::Offer);
        assert_eq!(sent[0].receiver_id, 2);
        assert_eq!(sent[0].sdp.as_deref(), Some("offer-sdp"));
    }

    #[tokio::test]
    async fn answer_then_remote_track_connects_the_call() {
        let provider = FakeProvider::default();
        let remote_sdp = provider.remote_sdp.clone();
        let (mut coordinator, _signals) = coordinator(provider);

        let call_id = coordinator.start_call(2, CallKind::Audio).await.unwrap();

        let mut answer = offer_from(2, &call_id);
        answer.kind = CallSignalKind::Answer;
        answer.sdp = Some("remote-answer".into());
        coordinator.handle_answer(answer).await;
        assert_eq!(coordinator.state(), CallState::Connecting);
        assert_eq!(remote_sdp.lock().unwrap().as_deref(), Some("remote-answer"));

        coordinator.handle_remote_track();
        assert_eq!(coordinator.state(), CallState::Connected);
    }

    #[tokio::test]
    async fn accepting_an_incoming_call_sends_the_answer() {
        let provider = FakeProvider::default();
        let remote_sdp = provider.remote_sdp.clone();
        let (mut coordinator, signals) = coordinator(provider);

        coordinator.handle_offer(offer_from(9, "call-1"));
        assert_eq!(coordinator.state(), CallState::IncomingRinging);

        coordinator.accept_call().await.unwrap();

        assert_eq!(coordinator.state(), CallState::Connecting);
        assert_eq!(remote_sdp.lock().unwrap().as_deref(), Some("remote-offer"));
        let sent = signals.sent.lock().unwrap();
        assert_eq!(sent[0].kind, CallSignalKind::Answer);
        assert_eq!(sent[0].receiver_id, 9);
        assert_eq!(sent[0].sdp.as_deref(), Some("answer-sdp"));
    }

    #[tokio::test]
    async fn rejecting_an_incoming_call_sends_end_without_media() {
        let provider = FakeProvider::default();
        let stopped = provider.stopped.clone();
        let (mut coordinator, signals) = coordinator(provider);

        coordinator.handle_offer(offer_from(9, "call-1"));
        coordinator.reject_call();

        assert!(!coordinator.state().is_active());
        assert_eq!(signals.kinds(), vec![CallSignalKind::End]);
        assert!(!stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn hanging_up_releases_media_and_notifies_the_peer() {
        let provider = FakeProvider::default();
        let stopped = provider.stopped.clone();
        let closed = provider.closed.clone();
        let (mut coordinator, signals) = coordinator(provider);

        coordinator.start_call(2, CallKind::Video).await.unwrap();
        coordinator.end_call();

        assert!(stopped.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert!(!coordinator.state().is_active());
        assert_eq!(signals.kinds(), vec![CallSignalKind::Offer, CallSignalKind::End]);

        // Idempotent: a second hangup sends nothing more.
        coordinator.end_call();
        assert_eq!(signals.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn terminal_connection_state_tears_down_without_end_signal() {
        let provider = FakeProvider::default();
        let stopped = provider.stopped.clone();
        let (mut coordinator, signals) = coordinator(provider);

        coordinator.start_call(2, CallKind::Audio).await.unwrap();
        coordinator.handle_connection_state(PeerConnectionState::Failed);

        assert!(!coordinator.state().is_active());
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(signals.kinds(), vec![CallSignalKind::Offer]);
    }

    #[tokio::test]
    async fn candidates_for_other_calls_are_dropped() {
        let provider = FakeProvider::default();
        let candidates = provider.candidates.clone();
        let (mut coordinator, _signals) = coordinator(provider);

        let call_id = coordinator.start_call(2, CallKind::Audio).await.unwrap();

        let mut stale = offer_from(2, "some-other-call");
        stale.kind = CallSignalKind::Candidate;
        stale.sdp = None;
        stale.candidate = Some("stale".into());
        coordinator.handle_candidate(stale).await;

        let mut current = offer_from(2, &call_id);
        current.kind = CallSignalKind::Candidate;
        current.sdp = None;
        current.candidate = Some("good".into());
        coordinator.handle_candidate(current).await;

        assert_eq!(*candidates.lock().unwrap(), vec!["good".to_owned()]);
    }

    #[tokio::test]
    async fn second_call_while_busy_is_refused() {
        let (mut coordinator, _signals) = coordinator(FakeProvider::default());

        coordinator.start_call(2, CallKind::Audio).await.unwrap();
        let err = coordinator.start_call(3, CallKind::Audio).await.unwrap_err();

        assert!(matches!(err, CallError::CallInProgress));
        assert_eq!(coordinator.state(), CallState::OutgoingRinging);
    }

    #[tokio::test]
    async fn media_failure_on_start_leaves_no_session() {
        let provider = FakeProvider {
            fail: true,
            ..FakeProvider::default()
        };
        let (mut coordinator, signals) = coordinator(provider);

        let err = coordinator.start_call(2, CallKind::Video).await.unwrap_err();

        assert!(matches!(err, CallError::Media(_)));
        assert!(!coordinator.state().is_active());
        assert!(coordinator.current_call_id().is_none());
        assert!(signals.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn negotiation_failure_on_accept_ends_the_call() {
        let provider = FakeProvider {
            fail_negotiation: true,
            ..FakeProvider::default()
        };
        let stopped = provider.stopped.clone();
        let closed = provider.closed.clone();
        let (mut coordinator, signals) = coordinator(provider);

        coordinator.handle_offer(offer_from(9, "call-1"));
        let err = coordinator.accept_call().await.unwrap_err();

        assert!(matches!(err, CallError::Negotiation(_)));
        assert!(!coordinator.state().is_active());
        assert!(stopped.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(signals.kinds(), vec![CallSignalKind::End]);
    }

    #[tokio::test]
    async fn mute_and_camera_toggles_report_the_new_state() {
        let (mut coordinator, _signals) = coordinator(FakeProvider::default());
        coordinator.start_call(2, CallKind::Video).await.unwrap();

        assert!(coordinator.toggle_mute());
        assert!(!coordinator.toggle_mute());
        assert!(coordinator.toggle_camera());
        assert!(!coordinator.toggle_camera());
    }

    #[tokio::test]
    async fn remote_end_tears_down_quietly() {
        let provider = FakeProvider::default();
        let stopped = provider.stopped.clone();
        let (mut coordinator, signals) = coordinator(provider);

        let call_id = coordinator.start_call(2, CallKind::Audio).await.unwrap();
        coordinator.handle_remote_end(&CallSignal::end(&call_id, 2, 1, CallKind::Audio));

        assert!(!coordinator.state().is_active());
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(signals.kinds(), vec![CallSignalKind::Offer]);
    }
}
