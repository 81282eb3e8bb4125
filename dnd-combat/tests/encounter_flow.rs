//! End-to-end encounter tests.
//!
//! Run with logging: `RUST_LOG=dnd_combat=debug cargo test -p dnd-combat --test encounter_flow -- --nocapture`

use dnd_combat::combatant::{AbilityScores, ProficiencyKind};
use dnd_combat::features::{Claws, FelineAgility, HalflingLuck};
use dnd_combat::resources::ResourceError;
use dnd_combat::testing::{assert_hp, assert_resource, sample_fighter, sample_goblin};
use dnd_combat::{
    ActionDefinition, Advantage, CombatError, Combatant, CombatantId, Condition, Encounter,
    EngineConfig, FeatureError, Resource, RestKind,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const SPELL_SLOTS: &str = r#"{
    "id": "level_1_spell_slots",
    "name": "Level 1 Spell Slots",
    "category": "spell_slot",
    "maximum": 2,
    "recharge": "long_rest",
    "source": "Wizard"
}"#;

const BURNING_HANDS: &str = r#"{
    "id": "burning_hands",
    "name": "Burning Hands",
    "kind": "action",
    "source": "Wizard",
    "save": { "ability": "Dexterity", "dc": { "type": "fixed", "dc": 30 } },
    "damage": [{ "count": 3, "sides": 6, "damage_type": "fire" }],
    "cost": { "resource": "level_1_spell_slots", "amount": 1 }
}"#;

const SHORTBOW: &str = r#"{
    "id": "shortbow",
    "name": "Shortbow",
    "kind": "action",
    "range": "ranged",
    "attack": { "type": "precomputed", "bonus": 4 },
    "damage": [{ "count": 1, "sides": 6, "damage_type": "piercing" }]
}"#;

fn wizard() -> Combatant {
    let mut wizard = Combatant::new("Elara")
        .with_ability_scores(AbilityScores::new(8, 14, 12, 16, 12, 10))
        .with_armor_class(12)
        .with_hit_points(8)
        .with_proficiency(ProficiencyKind::Weapon, "daggers");
    let slots: Resource = serde_json::from_str(SPELL_SLOTS).expect("slot definition");
    wizard.resources.add(slots);
    let spell: ActionDefinition = serde_json::from_str(BURNING_HANDS).expect("action definition");
    wizard.actions.add(spell);
    wizard
}

#[test]
fn test_loaded_spell_spends_slots_until_empty() {
    init_tracing();
    let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(11));
    let elara = encounter.add_combatant_with_initiative(wizard(), 20);
    let snik = encounter.add_combatant_with_initiative(sample_goblin("Snik"), 10);
    assert_eq!(encounter.start(), Some(elara));

    let outcome = encounter
        .request_save(elara, "burning_hands", snik, Advantage::Normal)
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.dc, 30);
    let burned = outcome.damage_total();
    assert!((3..=18).contains(&burned));
    assert_hp(encounter.combatant(snik).unwrap(), (7 - burned).max(0), 7);
    assert_resource(encounter.combatant(elara).unwrap(), "level_1_spell_slots", 1);

    encounter
        .request_save(elara, "burning_hands", snik, Advantage::Normal)
        .unwrap();
    assert_resource(encounter.combatant(elara).unwrap(), "level_1_spell_slots", 0);

    let hp_before = encounter.combatant(snik).unwrap().resources.hit_points.current;
    let err = encounter
        .request_save(elara, "burning_hands", snik, Advantage::Normal)
        .unwrap_err();
    assert_eq!(
        err,
        CombatError::Resource(ResourceError::Insufficient {
            id: "level_1_spell_slots".to_string(),
            requested: 1,
            available: 0,
        })
    );
    assert_eq!(
        encounter.combatant(snik).unwrap().resources.hit_points.current,
        hp_before
    );

    encounter.end();
    encounter.rest(elara, RestKind::Long).unwrap();
    assert_resource(encounter.combatant(elara).unwrap(), "level_1_spell_slots", 2);
}

#[test]
fn test_fight_until_someone_drops() {
    init_tracing();
    let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(2024));
    let roland = encounter.add_combatant(sample_fighter("Roland"));
    let snik = encounter.add_combatant(sample_goblin("Snik"));
    encounter.start();

    let mut turns = 0;
    while turns < 60 {
        let attacker = encounter.current().map(|c| c.id).unwrap();
        let (action, target) = if attacker == roland {
            ("longsword", snik)
        } else {
            ("scimitar", roland)
        };
        let outcome = encounter
            .attack(attacker, action, target, Advantage::Normal)
            .unwrap();
        assert_eq!(outcome.hit, outcome.damage.is_some());
        assert_eq!(outcome.hit, outcome.roll.total() >= outcome.target_ac);

        let hp = &encounter.combatant(target).unwrap().resources.hit_points;
        assert!(hp.current >= 0 && hp.current <= hp.maximum);
        if hp.current == 0 {
            break;
        }
        encounter.next_turn();
        turns += 1;
    }

    assert_eq!(encounter.round(), 1 + turns / 2);
    encounter.end();
    assert!(encounter.current().is_none());
}

#[test]
fn test_same_seed_same_initiative() {
    let roll = || {
        let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(5));
        let ids: Vec<CombatantId> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|name| encounter.add_combatant(sample_goblin(name)))
            .collect();
        ids.iter()
            .map(|id| encounter.tracker().initiative_of(*id))
            .collect::<Vec<_>>()
    };
    assert_eq!(roll(), roll());
}

#[test]
fn test_feline_agility_once_per_turn() {
    init_tracing();
    let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(3));
    let tabaxi = encounter.add_combatant_with_initiative(sample_fighter("Whiskers"), 18);
    let snik = encounter.add_combatant_with_initiative(sample_goblin("Snik"), 9);
    assert_eq!(encounter.attach_feature(tabaxi, FelineAgility::NAME), Ok(true));
    assert_eq!(encounter.attach_feature(tabaxi, FelineAgility::NAME), Ok(false));
    encounter.start();

    encounter.activate_feature(tabaxi, FelineAgility::NAME).unwrap();
    assert_eq!(encounter.combatant(tabaxi).unwrap().walking_speed(), 60);
    assert_eq!(
        encounter.activate_feature(tabaxi, FelineAgility::NAME),
        Err(CombatError::Feature(FeatureError::NotActivatable(
            FelineAgility::NAME.to_string()
        )))
    );

    assert_eq!(encounter.next_turn(), Some(snik));
    assert_eq!(encounter.combatant(tabaxi).unwrap().walking_speed(), 30);
    assert!(matches!(
        encounter.activate_feature(tabaxi, FelineAgility::NAME),
        Err(CombatError::NotYourTurn(_))
    ));

    assert_eq!(encounter.next_turn(), Some(tabaxi));
    assert_resource(
        encounter.combatant(tabaxi).unwrap(),
        FelineAgility::RESOURCE,
        1,
    );
}

#[test]
fn test_claws_grant_an_attack_until_detached() {
    let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(8));
    let tabaxi = encounter.add_combatant_with_initiative(sample_fighter("Whiskers"), 18);
    let snik = encounter.add_combatant_with_initiative(sample_goblin("Snik"), 9);
    encounter.attach_feature(tabaxi, Claws::NAME).unwrap();
    encounter.attach_feature(tabaxi, HalflingLuck::NAME).unwrap();
    encounter.start();

    let outcome = encounter
        .attack(tabaxi, Claws::ACTION, snik, Advantage::Normal)
        .unwrap();
    assert_eq!(outcome.target_ac, 15);
    if let Some(damage) = &outcome.damage {
        assert!(damage.total() >= 3);
    }

    encounter.detach_feature(tabaxi, Claws::NAME).unwrap();
    assert!(encounter.attack(tabaxi, Claws::ACTION, snik, Advantage::Normal).is_err());
    assert_eq!(
        encounter.detach_feature(tabaxi, Claws::NAME),
        Err(CombatError::Feature(FeatureError::NotAttached(
            Claws::NAME.to_string()
        )))
    );
    assert_eq!(
        encounter.attach_feature(tabaxi, "Wings"),
        Err(CombatError::Feature(FeatureError::Unknown("Wings".to_string())))
    );
}

#[test]
fn test_removing_current_combatant_passes_the_turn() {
    let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(1));
    let roland = encounter.add_combatant_with_initiative(sample_fighter("Roland"), 16);
    let snik = encounter.add_combatant_with_initiative(sample_goblin("Snik"), 12);
    let grub = encounter.add_combatant_with_initiative(sample_goblin("Grub"), 4);
    encounter.start();
    encounter.next_turn();
    assert_eq!(encounter.current().map(|c| c.id), Some(snik));

    let removed = encounter.remove_combatant(snik).unwrap();
    assert_eq!(removed.name, "Snik");
    assert_eq!(encounter.current().map(|c| c.id), Some(grub));
    assert_eq!(encounter.round(), 1);

    let names: Vec<&str> = encounter.combatants().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Roland", "Grub"]);
    assert_eq!(encounter.next_turn(), Some(roland));
    assert_eq!(encounter.round(), 2);
}

#[test]
fn test_config_from_json_drives_resolver() {
    let config = EngineConfig::from_json(
        r#"{ "seed": 99, "resolver": { "natural_rolls_decide": true } }"#,
    )
    .unwrap();
    assert_eq!(config.seed, Some(99));
    let encounter = Encounter::with_builtin_features(config);
    assert!(encounter.resolver().config().natural_rolls_decide);
    assert!(encounter.resolver().config().double_critical_dice);
}

#[test]
fn test_prone_target_favours_melee_over_ranged() {
    init_tracing();
    let mut encounter = Encounter::with_builtin_features(EngineConfig::new().with_seed(21));
    let mut archer = sample_goblin("Archer");
    let bow: ActionDefinition = serde_json::from_str(SHORTBOW).expect("action definition");
    archer.actions.add(bow);
    let archer = encounter.add_combatant_with_initiative(archer, 18);
    let roland = encounter.add_combatant_with_initiative(sample_fighter("Roland"), 9);
    encounter.add_condition(roland, Condition::Prone).unwrap();
    encounter.start();

    let outcome = encounter
        .attack(archer, "shortbow", roland, Advantage::Normal)
        .unwrap();
    assert_eq!(outcome.roll.advantage(), Advantage::Disadvantage);
    assert_eq!(outcome.roll.rolls().len(), 2);

    // Prone cancels a requested disadvantage in melee.
    encounter.add_condition(roland, Condition::Exhaustion { level: 2 }).unwrap();
    let outcome = encounter
        .attack(archer, "scimitar", roland, Advantage::Disadvantage)
        .unwrap();
    assert_eq!(outcome.roll.rolls().len(), 1);
    assert_eq!(encounter.combatant(roland).unwrap().walking_speed(), 15);
}
