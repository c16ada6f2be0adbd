use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use interview_core::preflight::Preflight;
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// What the audio host reports about its capture devices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputDevices {
    pub names: Vec<String>,
    pub default: Option<String>,
}

type DeviceLister = fn() -> Result<InputDevices>;

/// Lists the input devices of the default `cpal` host.
pub fn host_input_devices() -> Result<InputDevices> {
    let host = cpal::default_host();
    tracing::debug!("Host: {:?}", host.id());

    let default = host
        .default_input_device()
        .and_then(|device| device.name().ok());
    let names = host
        .input_devices()
        .context("Failed to enumerate input devices")?
        .filter_map(|device| device.name().ok())
        .collect();
    Ok(InputDevices { names, default })
}

/// The device a call would capture from: the named one if it exists,
/// otherwise the host default.
pub fn select_input(devices: &InputDevices, wanted: Option<&str>) -> Option<String> {
    match wanted {
        Some(name) => devices.names.iter().find(|n| n.as_str() == name).cloned(),
        None => devices.default.clone(),
    }
}

/// Checks the local machine: an input device must be available (the configured
/// one, or the host default) and the relay host must accept a TCP connection.
pub struct SystemPreflight {
    mic_device: Option<String>,
    list_inputs: DeviceLister,
    probe: Option<String>,
    timeout: Duration,
}

impl SystemPreflight {
    pub fn new(mic_device: Option<String>, relay_url: &str) -> Self {
        let probe = probe_address(relay_url);
        if probe.is_none() {
            tracing::warn!(relay_url, "cannot derive a host to probe, network check disabled");
        }
        Self {
            mic_device,
            list_inputs: host_input_devices,
            probe,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_device_lister(mut self, list_inputs: DeviceLister) -> Self {
        self.list_inputs = list_inputs;
        self
    }
}

#[async_trait]
impl Preflight for SystemPreflight {
    async fn microphone_permitted(&self) -> bool {
        // Device enumeration blocks on some hosts.
        let list_inputs = self.list_inputs;
        let devices = match tokio::task::spawn_blocking(list_inputs).await {
            Ok(Ok(devices)) => devices,
            Ok(Err(e)) => {
                tracing::warn!("microphone not accessible: {e:#}");
                return false;
            }
            Err(e) => {
                tracing::warn!("device enumeration task failed: {e}");
                return false;
            }
        };

        match select_input(&devices, self.mic_device.as_deref()) {
            Some(device) => {
                tracing::debug!(%device, "using input device");
                true
            }
            None => {
                tracing::warn!(
                    wanted = self.mic_device.as_deref().unwrap_or("default"),
                    available = ?devices.names,
                    "no matching input device"
                );
                false
            }
        }
    }

    async fn network_reachable(&self) -> bool {
        let Some(addr) = &self.probe else {
            return true;
        };
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(%addr, "network probe failed: {e}");
                false
            }
            Err(_) => {
                tracing::warn!(%addr, "network probe timed out");
                false
            }
        }
    }
}

/// `host:port` to probe for `url`, using the scheme's default port when the
/// URL names none.
pub fn probe_address(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn two_mics() -> Result<InputDevices> {
        Ok(InputDevices {
            names: vec!["Built-in Microphone".into(), "USB Headset".into()],
            default: Some("Built-in Microphone".into()),
        })
    }

    fn no_mics() -> Result<InputDevices> {
        Ok(InputDevices::default())
    }

    fn broken_host() -> Result<InputDevices> {
        Err(anyhow::anyhow!("ALSA lib pcm.c: Unknown PCM default"))
    }

    #[test]
    fn derives_probe_addresses() {
        assert_eq!(
            probe_address("wss://relay.example.com/call?x=1").as_deref(),
            Some("relay.example.com:443")
        );
        assert_eq!(
            probe_address("ws://127.0.0.1:8787/call").as_deref(),
            Some("127.0.0.1:8787")
        );
        assert_eq!(probe_address("ws://[::1]/call").as_deref(), Some("[::1]:80"));
        assert_eq!(
            probe_address("ws://user:p%40ss@relay.example.com/call").as_deref(),
            Some("relay.example.com:80")
        );
        assert_eq!(probe_address("relay.example.com"), None);
        assert_eq!(probe_address("mailto:ops@example.com"), None);
    }

    #[test]
    fn selects_named_or_default_input() {
        let devices = two_mics().unwrap();
        assert_eq!(
            select_input(&devices, Some("USB Headset")).as_deref(),
            Some("USB Headset")
        );
        assert_eq!(
            select_input(&devices, None).as_deref(),
            Some("Built-in Microphone")
        );
        assert_eq!(select_input(&devices, Some("Webcam")), None);
    }

    #[tokio::test]
    async fn microphone_requires_an_input_device() {
        let relay = "ws://127.0.0.1:1/call";

        let present = SystemPreflight::new(None, relay).with_device_lister(two_mics);
        let missing = SystemPreflight::new(None, relay).with_device_lister(no_mics);
        let unknown = SystemPreflight::new(Some("Webcam".into()), relay).with_device_lister(two_mics);
        let broken = SystemPreflight::new(None, relay).with_device_lister(broken_host);

        assert!(present.microphone_permitted().await);
        assert!(!missing.microphone_permitted().await);
        assert!(!unknown.microphone_permitted().await);
        assert!(!broken.microphone_permitted().await);
    }

    #[tokio::test]
    async fn probes_a_listening_relay() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let preflight = SystemPreflight::new(None, &format!("ws://127.0.0.1:{port}/call"));

        assert!(preflight.network_reachable().await);
    }
}
