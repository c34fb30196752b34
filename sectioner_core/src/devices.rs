//! Insertable-device interlocks: collision matrix, bounded insert/retract
//! polling, and the retract-everything safe baseline.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use sectioner_traits::{Clock, DeviceId, DeviceState, MicroscopeDriver};

use crate::error::{Fault, Result, map_driver_error};

/// Unordered pair of devices that must never both be away from the retracted
/// baseline at the same time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollisionRule(pub DeviceId, pub DeviceId);

impl CollisionRule {
    pub fn new(a: impl Into<DeviceId>, b: impl Into<DeviceId>) -> Self {
        Self(a.into(), b.into())
    }

    /// The other member of the pair, if `device` is part of this rule.
    pub fn partner(&self, device: &DeviceId) -> Option<&DeviceId> {
        if &self.0 == device {
            Some(&self.1)
        } else if &self.1 == device {
            Some(&self.0)
        } else {
            None
        }
    }
}

/// Interlock polling parameters, passed in at construction.
#[derive(Debug, Clone)]
pub struct InterlockCfg {
    /// State polls before an insert/retract degrades to a warning.
    pub poll_attempts: u32,
    /// Delay between state polls.
    pub poll_interval: Duration,
}

impl Default for InterlockCfg {
    fn default() -> Self {
        Self {
            poll_attempts: 20,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Insert/retract state machine guard with a static collision matrix.
pub struct InterlockManager {
    rules: Vec<CollisionRule>,
    cfg: InterlockCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl InterlockManager {
    pub fn new(
        rules: Vec<CollisionRule>,
        cfg: InterlockCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self { rules, cfg, clock }
    }

    pub fn rules(&self) -> &[CollisionRule] {
        &self.rules
    }

    fn state<D: MicroscopeDriver>(&self, driver: &mut D, id: &DeviceId) -> Result<DeviceState> {
        driver
            .device_state(id)
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("querying device state")
    }

    /// First rule partner of `device` that is not retracted, if any.
    pub fn blocking_device<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        device: &DeviceId,
    ) -> Result<Option<DeviceId>> {
        for rule in &self.rules {
            if let Some(partner) = rule.partner(device) {
                let state = self.state(driver, partner)?;
                if state != DeviceState::Retracted {
                    return Ok(Some(partner.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Insert `device`, refusing (without touching the device) when a
    /// collision-rule partner is not retracted.
    pub fn insert<D: MicroscopeDriver>(&self, driver: &mut D, device: &DeviceId) -> Result<()> {
        match self.state(driver, device)? {
            DeviceState::Error => {
                return Err(eyre::Report::new(Fault::Device {
                    device: device.clone(),
                    state: DeviceState::Error,
                }));
            }
            DeviceState::Inserted => {
                tracing::debug!(device = %device, "already inserted");
                return Ok(());
            }
            _ => {}
        }
        if let Some(blocked_by) = self.blocking_device(driver, device)? {
            return Err(eyre::Report::new(Fault::Collision {
                device: device.clone(),
                blocked_by,
            }));
        }
        tracing::info!(device = %device, "inserting device");
        driver
            .insert_device(device)
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("insert request")?;
        self.wait_for_state(driver, device, DeviceState::Inserted)?;
        Ok(())
    }

    /// Retract `device`; a no-op when it is already retracted.
    pub fn retract<D: MicroscopeDriver>(&self, driver: &mut D, device: &DeviceId) -> Result<()> {
        match self.state(driver, device)? {
            DeviceState::Error => {
                return Err(eyre::Report::new(Fault::Device {
                    device: device.clone(),
                    state: DeviceState::Error,
                }));
            }
            DeviceState::Retracted => return Ok(()),
            _ => {}
        }
        tracing::info!(device = %device, "retracting device");
        driver
            .retract_device(device)
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("retract request")?;
        self.wait_for_state(driver, device, DeviceState::Retracted)?;
        Ok(())
    }

    /// Retract every device the driver knows about. Idempotent; safe to call
    /// with nothing inserted.
    pub fn retract_all<D: MicroscopeDriver>(&self, driver: &mut D) -> Result<()> {
        let devices = driver
            .devices()
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("enumerating devices")?;
        for device in &devices {
            self.retract(driver, device)?;
        }
        tracing::debug!(count = devices.len(), "all devices retracted");
        Ok(())
    }

    /// Poll until `device` reports `want`. Exhausting the attempt budget is a
    /// warning, not a fault; a polled `Error` state is always fatal.
    fn wait_for_state<D: MicroscopeDriver>(
        &self,
        driver: &mut D,
        device: &DeviceId,
        want: DeviceState,
    ) -> Result<bool> {
        for _ in 0..self.cfg.poll_attempts {
            let state = self.state(driver, device)?;
            if state == want {
                return Ok(true);
            }
            if state == DeviceState::Error {
                return Err(eyre::Report::new(Fault::Device {
                    device: device.clone(),
                    state: DeviceState::Error,
                }));
            }
            self.clock.sleep(self.cfg.poll_interval);
        }
        tracing::warn!(
            device = %device,
            want = want.label(),
            attempts = self.cfg.poll_attempts,
            "device did not reach requested state within poll budget, continuing"
        );
        Ok(false)
    }
}
