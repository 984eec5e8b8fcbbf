//! Control-dependence configuration.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CdAlgorithm {
    /// Post-dominator based (Cytron-style).
    #[default]
    Classic,
    /// Non-termination sensitive.
    Ntscd,
    /// NTSCD computed on demand; same relation as `Ntscd`.
    Ntscd2,
    /// The original worklist formulation of Ranganath et al.
    NtscdRanganath,
    /// Accepted for compatibility; resolved to `Ntscd2` (the legacy
    /// computation was buggy and is not reimplemented).
    NtscdLegacy,
}

impl CdAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CdAlgorithm::Classic => "classic",
            CdAlgorithm::Ntscd => "ntscd",
            CdAlgorithm::Ntscd2 => "ntscd2",
            CdAlgorithm::NtscdRanganath => "ntscd-ranganath",
            CdAlgorithm::NtscdLegacy => "ntscd-legacy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CDOptions {
    pub algorithm: CdAlgorithm,
    /// Lift no-return behavior across call sites.
    pub interprocedural: bool,
    /// With the classic algorithm selected, switch to NTSCD so possibly
    /// diverging loops control the code after them.
    pub termination_sensitive: bool,
}

impl Default for CDOptions {
    fn default() -> Self {
        CDOptions {
            algorithm: CdAlgorithm::default(),
            interprocedural: true,
            termination_sensitive: false,
        }
    }
}

impl CDOptions {
    /// The algorithm that actually runs, after resolving the legacy
    /// alias and the termination-sensitivity override.
    pub fn effective_algorithm(&self) -> CdAlgorithm {
        match self.algorithm {
            CdAlgorithm::NtscdLegacy => CdAlgorithm::Ntscd2,
            CdAlgorithm::Classic if self.termination_sensitive => CdAlgorithm::Ntscd,
            other => other,
        }
    }
}
