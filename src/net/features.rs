use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Protocol capabilities negotiated per client/build version. Every
/// optional field a handler reads is decided by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameFeature {
    PlayerAddons,
    LooktypeU16,
    CreatureUnpassable,
    CreatureEmblems,
    ClearTargetId,
    PlayerMounts,
    CreatureType,
    BuddyStatus,
    ThingMarks,
    AdditionalVipInfo,
    MinimapRemove,
    ContainerPagination,
    ItemAnimationPhase,
    BaseSpeed,
    BuddyGroups,
    SummonMaster,
    CreatureIcons,
}

pub const ALL_FEATURES: [GameFeature; 17] = [
    GameFeature::PlayerAddons,
    GameFeature::LooktypeU16,
    GameFeature::CreatureUnpassable,
    GameFeature::CreatureEmblems,
    GameFeature::ClearTargetId,
    GameFeature::PlayerMounts,
    GameFeature::CreatureType,
    GameFeature::BuddyStatus,
    GameFeature::ThingMarks,
    GameFeature::AdditionalVipInfo,
    GameFeature::MinimapRemove,
    GameFeature::ContainerPagination,
    GameFeature::ItemAnimationPhase,
    GameFeature::BaseSpeed,
    GameFeature::BuddyGroups,
    GameFeature::SummonMaster,
    GameFeature::CreatureIcons,
];

/// Clients from this version on send a stack position with create-on-map.
const STACK_POS_ON_CREATE_VERSION: u16 = 841;

impl GameFeature {
    /// (client version, build version) the feature first appeared in.
    pub fn introduced_in(self) -> (u16, u16) {
        match self {
            GameFeature::PlayerAddons => (780, 0),
            GameFeature::LooktypeU16 => (780, 0),
            GameFeature::CreatureUnpassable => (854, 0),
            GameFeature::CreatureEmblems => (860, 0),
            GameFeature::ClearTargetId => (860, 0),
            GameFeature::PlayerMounts => (870, 0),
            GameFeature::CreatureType => (910, 0),
            GameFeature::BuddyStatus => (910, 0),
            GameFeature::ThingMarks => (1000, 0),
            GameFeature::AdditionalVipInfo => (1000, 0),
            GameFeature::MinimapRemove => (1000, 0),
            GameFeature::ContainerPagination => (1041, 0),
            GameFeature::ItemAnimationPhase => (1057, 0),
            GameFeature::BaseSpeed => (1059, 0),
            GameFeature::BuddyGroups => (1090, 0),
            GameFeature::SummonMaster => (1120, 0),
            GameFeature::CreatureIcons => (1200, 4),
        }
    }
}

/// Pure view of the negotiated protocol: which optional fields exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGate {
    client_version: u16,
    build_version: u16,
    features: BTreeSet<GameFeature>,
}

impl Default for FeatureGate {
    fn default() -> Self {
        Self::for_client(772, 0)
    }
}

impl FeatureGate {
    pub fn for_client(client_version: u16, build_version: u16) -> Self {
        let features = ALL_FEATURES
            .iter()
            .copied()
            .filter(|feature| feature.introduced_in() <= (client_version, build_version))
            .collect();
        Self {
            client_version,
            build_version,
            features,
        }
    }

    /// Gate with an explicit feature set, independent of version defaults.
    pub fn with_features(
        client_version: u16,
        build_version: u16,
        features: impl IntoIterator<Item = GameFeature>,
    ) -> Self {
        Self {
            client_version,
            build_version,
            features: features.into_iter().collect(),
        }
    }

    pub fn enable(&mut self, feature: GameFeature) {
        self.features.insert(feature);
    }

    pub fn disable(&mut self, feature: GameFeature) {
        self.features.remove(&feature);
    }

    pub fn client_version(&self) -> u16 {
        self.client_version
    }

    pub fn build_version(&self) -> u16 {
        self.build_version
    }

    pub fn features(&self) -> impl Iterator<Item = GameFeature> + '_ {
        self.features.iter().copied()
    }

    pub fn has_feature(&self, feature: GameFeature) -> bool {
        self.features.contains(&feature)
    }

    pub fn client_version_at_least(&self, version: u16) -> bool {
        self.client_version >= version
    }

    pub fn version_at_least(&self, version: u16, build: u16) -> bool {
        (self.client_version, self.build_version) >= (version, build)
    }

    pub fn create_has_stack_pos(&self) -> bool {
        self.client_version_at_least(STACK_POS_ON_CREATE_VERSION)
    }

    pub fn outfit_look_type_u16(&self) -> bool {
        self.has_feature(GameFeature::LooktypeU16)
    }

    pub fn outfit_has_addons(&self) -> bool {
        self.has_feature(GameFeature::PlayerAddons)
    }

    pub fn outfit_has_mount(&self) -> bool {
        self.has_feature(GameFeature::PlayerMounts)
    }

    pub fn creature_has_emblem(&self) -> bool {
        self.has_feature(GameFeature::CreatureEmblems)
    }

    pub fn creature_has_type(&self) -> bool {
        self.has_feature(GameFeature::CreatureType)
    }

    pub fn creature_has_summon_master(&self) -> bool {
        self.has_feature(GameFeature::CreatureType) && self.has_feature(GameFeature::SummonMaster)
    }

    pub fn creature_has_icons(&self) -> bool {
        self.has_feature(GameFeature::CreatureIcons)
    }

    pub fn creature_has_unpassable(&self) -> bool {
        self.has_feature(GameFeature::CreatureUnpassable)
    }

    pub fn object_has_mark(&self) -> bool {
        self.has_feature(GameFeature::ThingMarks)
    }

    pub fn object_has_animation_phase(&self) -> bool {
        self.has_feature(GameFeature::ItemAnimationPhase)
    }

    pub fn container_paginated(&self) -> bool {
        self.has_feature(GameFeature::ContainerPagination)
    }

    pub fn clear_target_has_id(&self) -> bool {
        self.has_feature(GameFeature::ClearTargetId)
    }

    pub fn speed_has_base(&self) -> bool {
        self.has_feature(GameFeature::BaseSpeed)
    }

    pub fn buddy_has_extended_info(&self) -> bool {
        self.has_feature(GameFeature::AdditionalVipInfo)
    }

    pub fn buddy_has_groups(&self) -> bool {
        self.has_feature(GameFeature::BuddyGroups)
    }

    pub fn buddy_state_has_status(&self) -> bool {
        self.has_feature(GameFeature::BuddyStatus)
    }

    pub fn automap_has_remove(&self) -> bool {
        self.has_feature(GameFeature::MinimapRemove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        version: u16,
        build: u16,
        stack_pos: bool,
        pagination: bool,
        addons: bool,
        mounts: bool,
        creature_type: bool,
        icons: bool,
    }

    const MATRIX: [Fixture; 6] = [
        Fixture {
            version: 772,
            build: 0,
            stack_pos: false,
            pagination: false,
            addons: false,
            mounts: false,
            creature_type: false,
            icons: false,
        },
        Fixture {
            version: 840,
            build: 0,
            stack_pos: false,
            pagination: false,
            addons: true,
            mounts: false,
            creature_type: false,
            icons: false,
        },
        Fixture {
            version: 841,
            build: 0,
            stack_pos: true,
            pagination: false,
            addons: true,
            mounts: false,
            creature_type: false,
            icons: false,
        },
        Fixture {
            version: 1041,
            build: 0,
            stack_pos: true,
            pagination: true,
            addons: true,
            mounts: true,
            creature_type: true,
            icons: false,
        },
        Fixture {
            version: 1200,
            build: 3,
            stack_pos: true,
            pagination: true,
            addons: true,
            mounts: true,
            creature_type: true,
            icons: false,
        },
        Fixture {
            version: 1200,
            build: 4,
            stack_pos: true,
            pagination: true,
            addons: true,
            mounts: true,
            creature_type: true,
            icons: true,
        },
    ];

    #[test]
    fn decision_points_follow_version_matrix() {
        for fixture in MATRIX {
            let gate = FeatureGate::for_client(fixture.version, fixture.build);
            let label = format!("{}.{}", fixture.version, fixture.build);
            assert_eq!(gate.create_has_stack_pos(), fixture.stack_pos, "{label}");
            assert_eq!(gate.container_paginated(), fixture.pagination, "{label}");
            assert_eq!(gate.outfit_has_addons(), fixture.addons, "{label}");
            assert_eq!(gate.outfit_has_mount(), fixture.mounts, "{label}");
            assert_eq!(gate.creature_has_type(), fixture.creature_type, "{label}");
            assert_eq!(gate.creature_has_icons(), fixture.icons, "{label}");
        }
    }

    #[test]
    fn version_comparison_is_lexicographic() {
        let gate = FeatureGate::for_client(1100, 2);
        assert!(gate.version_at_least(1100, 2));
        assert!(gate.version_at_least(1099, 9));
        assert!(!gate.version_at_least(1100, 3));
        assert!(gate.client_version_at_least(1100));
        assert!(!gate.client_version_at_least(1101));
    }

    #[test]
    fn explicit_feature_set_overrides_version_defaults() {
        let mut gate = FeatureGate::with_features(772, 0, [GameFeature::ContainerPagination]);
        assert!(gate.container_paginated());
        assert!(!gate.outfit_has_addons());
        gate.enable(GameFeature::PlayerAddons);
        gate.disable(GameFeature::ContainerPagination);
        assert!(gate.outfit_has_addons());
        assert!(!gate.container_paginated());
    }

    #[test]
    fn summon_master_needs_creature_type() {
        let gate = FeatureGate::with_features(1200, 0, [GameFeature::SummonMaster]);
        assert!(!gate.creature_has_summon_master());
        let gate = FeatureGate::for_client(1120, 0);
        assert!(gate.creature_has_summon_master());
    }

    #[test]
    fn feature_names_deserialize_from_snake_case() {
        let parsed: Vec<GameFeature> =
            serde_yaml::from_str("[container_pagination, player_mounts]").expect("yaml");
        assert_eq!(
            parsed,
            vec![GameFeature::ContainerPagination, GameFeature::PlayerMounts]
        );
    }
}
