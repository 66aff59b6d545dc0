/// EAPI feature flags consulted by the parsers and evaluators
///
/// Each flag gates one grammar extension. Known EAPIs map to fixed presets via
/// [`EapiAttrs::for_eapi`]; an absent or unknown EAPI gets the most permissive set.
///
/// See [PMS 2](https://projects.gentoo.org/pms/9/pms.html#eapis) and the feature
/// tables in the PMS appendix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EapiAttrs {
    /// `:slot` dependencies (EAPI 1+).
    pub slot_deps: bool,
    /// `:=`, `:*` and `:slot/subslot` (EAPI 5+).
    pub slot_operator: bool,
    /// `[flag]` USE dependencies (EAPI 2+).
    pub use_deps: bool,
    /// `(+)`/`(-)` USE dependency defaults (EAPI 4+).
    pub use_dep_defaults: bool,
    /// `!!` strong blockers (EAPI 2+).
    pub strong_blocks: bool,
    /// `::repo` dependencies (no official EAPI).
    pub repo_deps: bool,
    /// `->` renames in SRC_URI (EAPI 2+).
    pub src_uri_arrows: bool,
    /// `fetch+`/`mirror+` SRC_URI prefixes (EAPI 8+).
    pub selective_src_uri_restriction: bool,
    /// `??` in REQUIRED_USE (EAPI 5+).
    pub required_use_at_most_one_of: bool,
    /// Empty `|| ( )`/`^^ ( )` groups count as satisfied (EAPI 0 to 6).
    pub empty_groups_always_true: bool,
}

impl EapiAttrs {
    /// Everything allowed; used when no EAPI is given.
    pub const PERMISSIVE: EapiAttrs = EapiAttrs {
        slot_deps: true,
        slot_operator: true,
        use_deps: true,
        use_dep_defaults: true,
        strong_blocks: true,
        repo_deps: true,
        src_uri_arrows: true,
        selective_src_uri_restriction: true,
        required_use_at_most_one_of: true,
        empty_groups_always_true: false,
    };

    /// Feature set for an EAPI string
    ///
    /// ```
    /// use portage_depspec::EapiAttrs;
    ///
    /// assert!(!EapiAttrs::for_eapi(Some("4")).slot_operator);
    /// assert!(EapiAttrs::for_eapi(Some("5")).slot_operator);
    /// assert!(EapiAttrs::for_eapi(None).repo_deps);
    /// ```
    pub fn for_eapi(eapi: Option<&str>) -> Self {
        let Some(level) = eapi.and_then(official_level) else {
            return Self::PERMISSIVE;
        };
        EapiAttrs {
            slot_deps: level >= 1,
            slot_operator: level >= 5,
            use_deps: level >= 2,
            use_dep_defaults: level >= 4,
            strong_blocks: level >= 2,
            repo_deps: false,
            src_uri_arrows: level >= 2,
            selective_src_uri_restriction: level >= 8,
            required_use_at_most_one_of: level >= 5,
            empty_groups_always_true: level <= 6,
        }
    }
}

impl Default for EapiAttrs {
    fn default() -> Self {
        Self::PERMISSIVE
    }
}

fn official_level(eapi: &str) -> Option<u8> {
    match eapi {
        "0" => Some(0),
        "1" => Some(1),
        "2" => Some(2),
        "3" => Some(3),
        "4" => Some(4),
        "5" => Some(5),
        "6" => Some(6),
        "7" => Some(7),
        "8" => Some(8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eapi0_is_minimal() {
        let attrs = EapiAttrs::for_eapi(Some("0"));
        assert!(!attrs.slot_deps);
        assert!(!attrs.use_deps);
        assert!(!attrs.strong_blocks);
        assert!(!attrs.repo_deps);
        assert!(attrs.empty_groups_always_true);
    }

    #[test]
    fn eapi_progression() {
        assert!(EapiAttrs::for_eapi(Some("1")).slot_deps);
        assert!(!EapiAttrs::for_eapi(Some("3")).use_dep_defaults);
        assert!(EapiAttrs::for_eapi(Some("4")).use_dep_defaults);
        assert!(EapiAttrs::for_eapi(Some("6")).empty_groups_always_true);
        assert!(!EapiAttrs::for_eapi(Some("7")).empty_groups_always_true);
        assert!(!EapiAttrs::for_eapi(Some("7")).selective_src_uri_restriction);
        assert!(EapiAttrs::for_eapi(Some("8")).selective_src_uri_restriction);
    }

    #[test]
    fn unknown_eapi_is_permissive() {
        assert_eq!(EapiAttrs::for_eapi(Some("9-unknown")), EapiAttrs::PERMISSIVE);
        assert_eq!(EapiAttrs::for_eapi(None), EapiAttrs::default());
    }
}
