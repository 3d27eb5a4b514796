//! Effect activation policy.
//!
//! Whether the dots are on comes from two independent signals:
//! - the detector's automatic suggestion (`in_vehicle`)
//! - the user's manual on/off choice
//!
//! The activation mode picks which one wins. This lives next to the host
//! glue, not inside the detector: the detector only ever produces the
//! suggestion and never reads the user's choice.
//!
//! [`ActivationHandle`] shares one [`EffectSwitch`] between the host (mode
//! changes, manual toggles) and [`follow_detector`], and republishes the
//! resolved flag on a `watch` channel for the cue animator.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::ActivationMode;

/// Combine the configured mode, the detector suggestion and the manual flag.
///
/// In Auto the detector decides. In On and Off the manual flag decides;
/// entering either mode forces the flag to match, and a later toggle can
/// still flip it.
pub fn resolve_effect_active(mode: ActivationMode, in_vehicle: bool, manual_active: bool) -> bool {
    match mode {
        ActivationMode::Auto => in_vehicle,
        ActivationMode::On | ActivationMode::Off => manual_active,
    }
}

/// Tracks the two activation signals and the resolved result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSwitch {
    mode: ActivationMode,
    in_vehicle: bool,
    manual_active: bool,
}

impl EffectSwitch {
    pub fn new(mode: ActivationMode) -> Self {
        Self {
            mode,
            in_vehicle: false,
            manual_active: mode == ActivationMode::On,
        }
    }

    /// Switch modes. Entering On or Off also forces the manual flag to match.
    pub fn set_mode(&mut self, mode: ActivationMode) -> bool {
        self.mode = mode;
        match mode {
            ActivationMode::On => self.manual_active = true,
            ActivationMode::Off => self.manual_active = false,
            ActivationMode::Auto => {}
        }
        self.is_active()
    }

    /// Record a new detector suggestion.
    pub fn set_in_vehicle(&mut self, in_vehicle: bool) -> bool {
        self.in_vehicle = in_vehicle;
        self.is_active()
    }

    /// Flip the manual flag. Ignored in Auto mode, where the detector rules.
    ///
    /// Returns whether the toggle was applied.
    pub fn toggle(&mut self) -> bool {
        if self.mode == ActivationMode::Auto {
            debug!("manual toggle ignored in auto mode");
            return false;
        }
        self.manual_active = !self.manual_active;
        true
    }

    pub fn mode(&self) -> ActivationMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        resolve_effect_active(self.mode, self.in_vehicle, self.manual_active)
    }
}

/// Shared [`EffectSwitch`] that publishes every change of the resolved flag.
#[derive(Clone)]
pub struct ActivationHandle {
    switch: Arc<Mutex<EffectSwitch>>,
    active_tx: Arc<watch::Sender<bool>>,
}

impl ActivationHandle {
    pub fn new(mode: ActivationMode) -> Self {
        let switch = EffectSwitch::new(mode);
        let (active_tx, _) = watch::channel(switch.is_active());
        Self {
            switch: Arc::new(Mutex::new(switch)),
            active_tx: Arc::new(active_tx),
        }
    }

    /// Subscribe to the resolved effect-active flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.active_tx.subscribe()
    }

    pub fn is_active(&self) -> bool {
        *self.active_tx.borrow()
    }

    pub fn mode(&self) -> ActivationMode {
        self.update(|switch| switch.mode())
    }

    pub fn set_mode(&self, mode: ActivationMode) -> bool {
        self.update(|switch| switch.set_mode(mode))
    }

    pub fn set_in_vehicle(&self, in_vehicle: bool) -> bool {
        self.update(|switch| switch.set_in_vehicle(in_vehicle))
    }

    /// See [`EffectSwitch::toggle`].
    pub fn toggle(&self) -> bool {
        self.update(|switch| switch.toggle())
    }

    fn update<T>(&self, f: impl FnOnce(&mut EffectSwitch) -> T) -> T {
        let mut switch = self.switch.lock().unwrap_or_else(PoisonError::into_inner);
        let out = f(&mut *switch);
        let active = switch.is_active();
        // Published under the lock so concurrent updates cannot reorder.
        self.active_tx.send_if_modified(|current| {
            if *current == active {
                return false;
            }
            *current = active;
            info!("motion cue effect {}", if active { "activated" } else { "deactivated" });
            true
        });
        out
    }
}

/// Forward detector suggestions into `activation` until cancelled or the
/// detector side goes away.
pub async fn follow_detector(
    activation: ActivationHandle,
    mut in_vehicle: watch::Receiver<bool>,
    cancel_token: CancellationToken,
) {
    activation.set_in_vehicle(*in_vehicle.borrow_and_update());
    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            changed = in_vehicle.changed() => {
                if changed.is_err() {
                    debug!("detector channel closed");
                    break;
                }
                let suggestion = *in_vehicle.borrow_and_update();
                activation.set_in_vehicle(suggestion);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_truth_table() {
        use ActivationMode::*;
        for &vehicle in &[false, true] {
            assert!(!resolve_effect_active(Off, vehicle, false));
            assert!(resolve_effect_active(On, vehicle, true));
            // Toggled away from the mode default.
            assert!(resolve_effect_active(Off, vehicle, true));
            assert!(!resolve_effect_active(On, vehicle, false));
            assert_eq!(resolve_effect_active(Auto, vehicle, false), vehicle);
            assert_eq!(resolve_effect_active(Auto, vehicle, true), vehicle);
        }
    }

    #[test]
    fn test_auto_follows_detector() {
        let mut switch = EffectSwitch::new(ActivationMode::Auto);
        assert!(!switch.is_active());
        assert!(switch.set_in_vehicle(true));
        assert!(!switch.set_in_vehicle(false));
    }

    #[test]
    fn test_toggle_ignored_in_auto() {
        let mut switch = EffectSwitch::new(ActivationMode::Auto);
        assert!(!switch.toggle());
        assert!(!switch.is_active());
    }

    #[test]
    fn test_manual_modes() {
        let mut switch = EffectSwitch::new(ActivationMode::On);
        assert!(switch.is_active());
        // The detector has no say outside Auto.
        switch.set_in_vehicle(false);
        assert!(switch.is_active());

        assert!(switch.toggle());
        assert!(!switch.is_active());

        assert!(!switch.set_mode(ActivationMode::Off));
        assert!(switch.toggle());
        assert!(switch.is_active());

        assert!(switch.set_mode(ActivationMode::On));
    }

    #[test]
    fn test_returning_to_auto_uses_latest_suggestion() {
        let mut switch = EffectSwitch::new(ActivationMode::Off);
        switch.set_in_vehicle(true);
        assert!(!switch.is_active());
        assert!(switch.set_mode(ActivationMode::Auto));
    }

    #[test]
    fn test_handle_publishes_only_changes() {
        let handle = ActivationHandle::new(ActivationMode::Auto);
        let mut rx = handle.subscribe();
        assert!(!handle.is_active());

        handle.set_in_vehicle(false);
        assert!(!rx.has_changed().unwrap());

        assert!(handle.set_in_vehicle(true));
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        // Forcing Off wins over the detector.
        assert!(!handle.set_mode(ActivationMode::Off));
        assert!(!*rx.borrow_and_update());
        assert!(handle.toggle());
        assert!(handle.is_active());
        assert_eq!(handle.mode(), ActivationMode::Off);
    }

    #[tokio::test]
    async fn test_follow_detector() {
        let handle = ActivationHandle::new(ActivationMode::Auto);
        let mut active = handle.subscribe();
        let (vehicle_tx, vehicle_rx) = watch::channel(false);
        let token = CancellationToken::new();
        let task = tokio::spawn(follow_detector(handle.clone(), vehicle_rx, token.clone()));

        vehicle_tx.send(true).unwrap();
        active.changed().await.unwrap();
        assert!(*active.borrow_and_update());

        vehicle_tx.send(false).unwrap();
        active.changed().await.unwrap();
        assert!(!*active.borrow_and_update());

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_follow_detector_exits_when_detector_drops() {
        let handle = ActivationHandle::new(ActivationMode::On);
        let (vehicle_tx, vehicle_rx) = watch::channel(true);
        let task = tokio::spawn(follow_detector(handle.clone(), vehicle_rx, CancellationToken::new()));

        drop(vehicle_tx);
        task.await.unwrap();
        assert!(handle.is_active());
    }
}
