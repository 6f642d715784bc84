use std::fmt;

use crate::processo::CaseNumber;

/// Court systems the batch knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tribunal {
    /// TJPR, served by the Projudi regional portal.
    Projudi,
    /// TJRS tenant of the eproc system.
    EprocRs,
    /// TJSC tenant of the eproc system.
    EprocSc,
}

impl Tribunal {
    pub const ALL: [Tribunal; 3] = [Tribunal::Projudi, Tribunal::EprocRs, Tribunal::EprocSc];

    pub fn court_code(self) -> &'static str {
        match self {
            Tribunal::Projudi => "816",
            Tribunal::EprocRs => "821",
            Tribunal::EprocSc => "824",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tribunal::Projudi => "Projudi",
            Tribunal::EprocRs => "Eproc RS",
            Tribunal::EprocSc => "Eproc SC",
        }
    }

    fn from_court_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.court_code() == code)
    }
}

impl fmt::Display for Tribunal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Routing decision for a single case number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Supported(Tribunal),
    Unsupported,
}

/// Classifies a raw case number into the portal that owns it.
///
/// Total: malformed input normalizes to something that matches no court code.
pub fn classify(raw: &str) -> Route {
    classify_number(&CaseNumber::normalize(raw))
}

pub fn classify_number(number: &CaseNumber) -> Route {
    match number.court_code().and_then(Tribunal::from_court_code) {
        Some(tribunal) => Route::Supported(tribunal),
        None => Route::Unsupported,
    }
}
