//! The locked/unlocked state machine
//!
//! Owns the single in-memory vault key. Unlock derives a key from the
//! stored salt and compares verifiers in constant time; lock drops the key
//! (zeroized by `Secret`) immediately. Repeated failures trigger a lockout
//! window; an inactivity deadline is reported for the shell to act on.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::kdf::{self, MasterKeyRecord, SecretKey};

/// Observable lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No master key record exists yet
    Uninitialized,
    Locked,
    Unlocked,
}

/// Master-key lifecycle state machine
pub struct VaultKeyState {
    master: Option<MasterKeyRecord>,
    /// The in-memory vault key; exactly one instance process-wide
    key: Option<SecretKey>,
    failed_attempts: u32,
    lockout_until: Option<Instant>,
    last_activity: Instant,
    max_unlock_attempts: u32,
    lockout_duration: Duration,
    auto_lock_timeout: Duration,
}

impl VaultKeyState {
    /// Build from the persisted master record (if any) and config limits
    pub fn new(master: Option<MasterKeyRecord>, config: &VaultConfig) -> Self {
        Self {
            master,
            key: None,
            failed_attempts: 0,
            lockout_until: None,
            last_activity: Instant::now(),
            max_unlock_attempts: config.max_unlock_attempts,
            lockout_duration: Duration::from_secs(config.lockout_duration_seconds),
            auto_lock_timeout: Duration::from_secs(config.auto_lock_timeout_seconds),
        }
    }

    pub fn state(&self) -> LockState {
        match (&self.master, &self.key) {
            (None, _) => LockState::Uninitialized,
            (Some(_), None) => LockState::Locked,
            (Some(_), Some(_)) => LockState::Unlocked,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.state() == LockState::Unlocked
    }

    /// The stored master record, if a passphrase has ever been set
    pub fn master(&self) -> Option<&MasterKeyRecord> {
        self.master.as_ref()
    }

    /// Set the initial passphrase. Only valid while `Uninitialized`;
    /// transitions straight to `Unlocked`. Returns the record to persist.
    pub fn set_passphrase(
        &mut self,
        passphrase: &str,
        params: &kdf::KdfParams,
    ) -> VaultResult<MasterKeyRecord> {
        if self.master.is_some() {
            return Err(VaultError::Config(
                "passphrase already set - use change_passphrase".into(),
            ));
        }

        let (record, key) = kdf::set_passphrase(passphrase, params)?;
        self.master = Some(record.clone());
        self.key = Some(key);
        self.last_activity = Instant::now();
        info!("master passphrase set, vault unlocked");
        Ok(record)
    }

    /// Attempt to unlock with a passphrase.
    ///
    /// Returns `true` and holds the key in memory on a verifier match,
    /// `false` otherwise - never an error, so a caller cannot distinguish
    /// failure paths beyond the boolean. During a lockout window every
    /// attempt reports `false` without doing any derivation work.
    pub fn unlock(&mut self, passphrase: &str) -> VaultResult<bool> {
        let master = match &self.master {
            Some(m) => m.clone(),
            None => return Err(VaultError::Config("no passphrase set".into())),
        };

        if self.is_locked_out() {
            warn!("unlock attempt during lockout window");
            return Ok(false);
        }

        let key = kdf::derive_key(passphrase, &master.salt, &master.kdf)?;
        if kdf::check_verifier(&key, &master.verifier) {
            self.key = Some(key);
            self.failed_attempts = 0;
            self.lockout_until = None;
            self.last_activity = Instant::now();
            info!("vault unlocked");
            Ok(true)
        } else {
            self.failed_attempts += 1;
            if self.failed_attempts >= self.max_unlock_attempts {
                self.lockout_until = Some(Instant::now() + self.lockout_duration);
                warn!(
                    attempts = self.failed_attempts,
                    "unlock failed, lockout engaged"
                );
            }
            Ok(false)
        }
    }

    /// Lock the vault. The key is dropped (and zeroized) immediately; any
    /// in-flight secret-field operation fails from this point on.
    pub fn lock(&mut self) {
        if self.key.take().is_some() {
            info!("vault locked");
        }
    }

    /// Borrow the live key, or fail with [`VaultError::Locked`]
    pub fn key(&self) -> VaultResult<&SecretKey> {
        self.key.as_ref().ok_or(VaultError::Locked)
    }

    /// Install a replacement master record and key in one step. Used by the
    /// passphrase-change flow after the re-encrypted records have been
    /// committed.
    pub fn install(&mut self, master: MasterKeyRecord, key: SecretKey) {
        self.master = Some(master);
        self.key = Some(key);
        self.last_activity = Instant::now();
    }

    pub fn is_locked_out(&self) -> bool {
        self.lockout_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    pub fn lockout_remaining_seconds(&self) -> u64 {
        match self.lockout_until {
            Some(until) => until.saturating_duration_since(Instant::now()).as_secs(),
            None => 0,
        }
    }

    /// Record activity (resets the auto-lock timer)
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Whether the inactivity window has elapsed. The shell decides when to
    /// call [`lock`](Self::lock).
    pub fn should_auto_lock(&self) -> bool {
        self.is_unlocked() && self.last_activity.elapsed() > self.auto_lock_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfParams;

    fn config() -> VaultConfig {
        VaultConfig {
            max_unlock_attempts: 3,
            lockout_duration_seconds: 60,
            ..VaultConfig::default()
        }
    }

    fn unlocked_state(passphrase: &str) -> VaultKeyState {
        let mut state = VaultKeyState::new(None, &config());
        state
            .set_passphrase(passphrase, &KdfParams::insecure_test_params())
            .unwrap();
        state
    }

    #[test]
    fn starts_uninitialized_without_master_record() {
        let state = VaultKeyState::new(None, &config());
        assert_eq!(state.state(), LockState::Uninitialized);
    }

    #[test]
    fn set_passphrase_unlocks() {
        let state = unlocked_state("correct-horse");
        assert_eq!(state.state(), LockState::Unlocked);
        assert!(state.key().is_ok());
    }

    #[test]
    fn unlock_accepts_correct_passphrase_and_rejects_wrong_repeatedly() {
        let mut state = unlocked_state("correct-horse");
        state.lock();
        assert_eq!(state.state(), LockState::Locked);

        assert!(!state.unlock("wrong").unwrap());
        assert_eq!(state.state(), LockState::Locked);
        assert!(!state.unlock("also wrong").unwrap());
        assert_eq!(state.state(), LockState::Locked);

        assert!(state.unlock("correct-horse").unwrap());
        assert_eq!(state.state(), LockState::Unlocked);
    }

    #[test]
    fn lock_drops_the_key() {
        let mut state = unlocked_state("pw");
        state.lock();
        assert!(matches!(state.key(), Err(VaultError::Locked)));
    }

    #[test]
    fn lockout_engages_after_max_attempts() {
        let mut state = unlocked_state("pw");
        state.lock();

        for _ in 0..3 {
            assert!(!state.unlock("wrong").unwrap());
        }
        assert!(state.is_locked_out());
        assert!(state.lockout_remaining_seconds() > 0);

        // Even the correct passphrase is refused during the window
        assert!(!state.unlock("pw").unwrap());
    }

    #[test]
    fn successful_unlock_resets_attempt_counter() {
        let mut state = unlocked_state("pw");
        state.lock();

        assert!(!state.unlock("wrong").unwrap());
        assert!(!state.unlock("wrong").unwrap());
        assert!(state.unlock("pw").unwrap());
        state.lock();

        // Counter restarted: two more failures do not lock out
        assert!(!state.unlock("wrong").unwrap());
        assert!(!state.unlock("wrong").unwrap());
        assert!(!state.is_locked_out());
    }

    #[test]
    fn second_set_passphrase_is_rejected() {
        let mut state = unlocked_state("pw");
        let result = state.set_passphrase("other", &KdfParams::insecure_test_params());
        assert!(matches!(result, Err(VaultError::Config(_))));
    }
}
