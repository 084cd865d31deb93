use std::fmt;

/// Step of a single `execute` call, used to tag log lines.
///
/// Terminal states are the [`Outcome`](super::Outcome) variants themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// Fast-path ledger lookup outside any transaction.
    Checking,
    Begun,
    Validating,
    Mutating,
    /// Ledger insert inside the same unit as the balance mutations.
    Recording,
    Committing,
}

impl TransferPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferPhase::Checking => "checking",
            TransferPhase::Begun => "begun",
            TransferPhase::Validating => "validating",
            TransferPhase::Mutating => "mutating",
            TransferPhase::Recording => "recording",
            TransferPhase::Committing => "committing",
        }
    }
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
