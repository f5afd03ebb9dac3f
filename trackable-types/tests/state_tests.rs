use std::str::FromStr;
use trackable_types::{Error, RelationshipKind, TrackingState};

// ── TrackingState ─────────────────────────────────────────────────

#[test]
fn default_state_is_unchanged() {
    assert_eq!(TrackingState::default(), TrackingState::Unchanged);
}

#[test]
fn only_unchanged_is_not_a_change() {
    assert!(!TrackingState::Unchanged.is_changed());
    assert!(TrackingState::Added.is_changed());
    assert!(TrackingState::Modified.is_changed());
    assert!(TrackingState::Deleted.is_changed());
}

#[test]
fn state_display_and_parse_roundtrip() {
    for state in TrackingState::ALL {
        assert_eq!(TrackingState::from_str(&state.to_string()).unwrap(), state);
    }
}

#[test]
fn state_parse_is_case_insensitive() {
    assert_eq!("deleted".parse::<TrackingState>().unwrap(), TrackingState::Deleted);
    assert_eq!("ADDED".parse::<TrackingState>().unwrap(), TrackingState::Added);
}

#[test]
fn state_parse_unknown() {
    assert!(matches!(
        "Detached".parse::<TrackingState>(),
        Err(Error::UnknownTrackingState(s)) if s == "Detached"
    ));
}

#[test]
fn state_serializes_by_name() {
    assert_eq!(serde_json::to_string(&TrackingState::Modified).unwrap(), "\"Modified\"");
    let parsed: TrackingState = serde_json::from_str("\"Added\"").unwrap();
    assert_eq!(parsed, TrackingState::Added);
}

// ── RelationshipKind ──────────────────────────────────────────────

#[test]
fn reference_kinds() {
    assert!(RelationshipKind::OneToOne.is_reference());
    assert!(RelationshipKind::ManyToOne.is_reference());
    assert!(!RelationshipKind::OneToMany.is_reference());
    assert!(!RelationshipKind::ManyToMany.is_reference());
}

#[test]
fn collection_kinds() {
    assert!(RelationshipKind::OneToMany.is_collection());
    assert!(RelationshipKind::ManyToMany.is_collection());
    assert!(!RelationshipKind::ManyToOne.is_collection());
}

#[test]
fn only_one_to_one_and_one_to_many_are_owned() {
    assert!(RelationshipKind::OneToOne.is_owned());
    assert!(RelationshipKind::OneToMany.is_owned());
    assert!(!RelationshipKind::ManyToOne.is_owned());
    assert!(!RelationshipKind::ManyToMany.is_owned());
}

#[test]
fn kind_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&RelationshipKind::ManyToMany).unwrap(),
        "\"many_to_many\""
    );
    for kind in [
        RelationshipKind::OneToOne,
        RelationshipKind::OneToMany,
        RelationshipKind::ManyToOne,
        RelationshipKind::ManyToMany,
    ] {
        assert_eq!(kind.to_string().parse::<RelationshipKind>().unwrap(), kind);
    }
}

#[test]
fn kind_parse_unknown() {
    assert!(matches!(
        "many_to_few".parse::<RelationshipKind>(),
        Err(Error::UnknownRelationshipKind(_))
    ));
}
