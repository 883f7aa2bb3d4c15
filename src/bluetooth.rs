use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::events::{PlatformEvent, StreamType};
use crate::sound::PlatformError;

/// Contract of the Bluetooth audio-gateway service.
pub trait BluetoothGateway {
    fn is_sco_opened(&self) -> Result<bool, PlatformError>;

    fn speaker_gain(&self) -> Result<u32, PlatformError>;

    /// Ask the peer to change its speaker gain. The peer acknowledges later
    /// through a `SpeakerGainChanged` notification, or not at all.
    fn request_speaker_gain(&mut self, gain: u32) -> Result<(), PlatformError>;
}

/// Mirror of the SCO link and the gain shown for a Bluetooth-routed call.
///
/// The displayed gain is optimistic: a request is shown immediately and a
/// later peer-reported gain overrides it.
#[derive(Debug, Default)]
pub struct BluetoothBridge {
    sco_open: bool,
    displayed_gain: Option<u32>,
}

impl BluetoothBridge {
    pub fn new(sco_open: bool) -> Self {
        Self {
            sco_open,
            displayed_gain: None,
        }
    }

    pub fn sco_open(&self) -> bool {
        self.sco_open
    }

    /// Whether volume changes for `stream` go to the Bluetooth peer.
    pub fn routes(&self, stream: StreamType) -> bool {
        self.sco_open && stream == StreamType::Call
    }

    pub fn on_sco_state(&mut self, opened: bool) {
        if self.sco_open != opened {
            info!(opened, "bluetooth SCO link state changed");
        }
        self.sco_open = opened;
        if !opened {
            self.displayed_gain = None;
        }
    }

    /// Re-read the link state from the gateway, keeping the last known state on failure.
    pub fn sync<G: BluetoothGateway>(&mut self, gateway: &G) -> Result<(), PlatformError> {
        let opened = gateway.is_sco_opened()?;
        self.on_sco_state(opened);
        Ok(())
    }

    /// Gain to display for the call stream.
    pub fn gain<G: BluetoothGateway>(&self, gateway: &G) -> Result<u32, PlatformError> {
        match self.displayed_gain {
            Some(gain) => Ok(gain),
            None => gateway.speaker_gain(),
        }
    }

    /// Request `gain` from the peer and show it immediately.
    pub fn request_gain<G: BluetoothGateway>(
        &mut self,
        gateway: &mut G,
        gain: u32,
    ) -> Result<u32, PlatformError> {
        gateway.request_speaker_gain(gain)?;
        debug!(gain, "requested bluetooth speaker gain");
        self.displayed_gain = Some(gain);
        Ok(gain)
    }

    /// Peer-reported gain, authoritative over any optimistic value.
    pub fn on_peer_gain(&mut self, gain: u32) {
        self.displayed_gain = Some(gain);
    }

    /// Forget the optimistic gain so the next read goes to the gateway.
    pub fn reset_display(&mut self) {
        self.displayed_gain = None;
    }
}

/// In-memory stand-in for the Bluetooth audio gateway.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    sco_opened: bool,
    gain: u32,
    requests: Vec<u32>,
    fail_requests: bool,
    notifier: Option<UnboundedSender<PlatformEvent>>,
}

impl SimulatedGateway {
    pub fn new(sco_opened: bool, gain: u32) -> Self {
        Self {
            sco_opened,
            gain,
            ..Self::default()
        }
    }

    pub fn with_notifier(mut self, notifier: UnboundedSender<PlatformEvent>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn set_sco(&mut self, opened: bool) {
        self.sco_opened = opened;
        self.notify(PlatformEvent::ScoStateChanged { opened });
    }

    /// The peer changed its own gain, e.g. from the headset's buttons.
    pub fn peer_set_gain(&mut self, gain: u32) {
        self.gain = gain;
        self.notify(PlatformEvent::SpeakerGainChanged { gain });
    }

    /// Gains requested so far, oldest first.
    pub fn requests(&self) -> &[u32] {
        &self.requests
    }

    pub fn fail_requests(&mut self, fail: bool) {
        self.fail_requests = fail;
    }

    fn notify(&self, event: PlatformEvent) {
        if let Some(tx) = &self.notifier {
            if tx.send(event).is_err() {
                debug!(?event, "platform listener gone; dropping notification");
            }
        }
    }
}

impl BluetoothGateway for SimulatedGateway {
    fn is_sco_opened(&self) -> Result<bool, PlatformError> {
        Ok(self.sco_opened)
    }

    fn speaker_gain(&self) -> Result<u32, PlatformError> {
        Ok(self.gain)
    }

    fn request_speaker_gain(&mut self, gain: u32) -> Result<(), PlatformError> {
        if self.fail_requests {
            return Err(PlatformError::CallFailed {
                service: "bluetooth-ag",
                reason: "speaker gain request rejected".into(),
            });
        }
        // No acknowledgement is sent; the peer applies the gain silently.
        self.requests.push(gain);
        self.gain = gain;
        Ok(())
    }
}
