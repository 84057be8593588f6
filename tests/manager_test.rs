//! End-to-end tests of the manager against files on disk.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use mannequin_adb::*;
use tempfile::TempDir;

const TAGS: &str = r#"<TagDefinition version="2">
  <Tag name="Crouch"/>
  <Tag name="Armed"/>
  <Tag name="Swim"/>
</TagDefinition>"#;

const FRAGS: &str = r#"<TagDefinition version="2">
  <Tag name="Idle"/>
  <Tag name="Move"/>
  <Tag name="Jump"/>
</TagDefinition>"#;

const DEF: &str = r#"<ControllerDef>
  <Tags filename="tags.xml"/>
  <Fragments filename="frags.xml"/>
</ControllerDef>"#;

const PLAYER: &str = r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml">
  <SubADBs>
    <SubADB Tags="Crouch" File="crouch.adb"/>
    <SubADB File="move.adb">
      <FragmentID Name="Move"/>
    </SubADB>
  </SubADBs>
  <FragmentList>
    <Idle>
      <Fragment Tags=""><AnimLayer><Blend/><Animation name="idle"/></AnimLayer></Fragment>
    </Idle>
  </FragmentList>
  <FragmentBlendList>
    <Blend from="" to="">
      <Variant from="" to="">
        <Fragment selectTime="0.25" enterTime="0"/>
      </Variant>
    </Blend>
  </FragmentBlendList>
</AnimDB>"#;

const CROUCH: &str = r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml">
  <SubADBs>
    <SubADB Tags="Armed" File="crouch_armed.adb"/>
  </SubADBs>
  <FragmentList>
    <Idle>
      <Fragment Tags="Crouch"><AnimLayer><Blend/><Animation name="crouch_idle"/></AnimLayer></Fragment>
    </Idle>
  </FragmentList>
  <FragmentBlendList>
    <Blend from="Idle" to="Move">
      <Variant from="Crouch" to="Crouch">
        <Fragment selectTime="0.5" enterTime="0"/>
      </Variant>
    </Blend>
  </FragmentBlendList>
</AnimDB>"#;

const CROUCH_ARMED: &str = r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml">
  <FragmentList>
    <Idle>
      <Fragment Tags="Crouch+Armed"><AnimLayer><Blend/><Animation name="crouch_armed_idle"/></AnimLayer></Fragment>
    </Idle>
  </FragmentList>
</AnimDB>"#;

const MOVE: &str = r#"<AnimDB FragDef="frags.xml" TagDef="tags.xml">
  <FragmentList>
    <Move>
      <Fragment Tags=""><AnimLayer><Blend/><Animation name="move"/></AnimLayer></Fragment>
    </Move>
  </FragmentList>
</AnimDB>"#;

fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        fs::write(dir.join(name), content).unwrap();
    }
}

fn setup() -> (TempDir, AnimationDatabaseManager) {
    let dir = TempDir::new().unwrap();
    write_files(
        dir.path(),
        &[
            ("tags.xml", TAGS),
            ("frags.xml", FRAGS),
            ("def.xml", DEF),
            ("player.adb", PLAYER),
            ("crouch.adb", CROUCH),
            ("crouch_armed.adb", CROUCH_ARMED),
            ("move.adb", MOVE),
        ],
    );
    let manager = manager_in(dir.path());
    (dir, manager)
}

fn manager_in(dir: &Path) -> AnimationDatabaseManager {
    AnimationDatabaseManager::new(ManagerConfig::default().with_root_dir(dir))
}

fn global(manager: &AnimationDatabaseManager, db: DatabaseId, list: &str) -> FragTagState {
    let db = manager.database(db).unwrap();
    let parsed = manager.tag_def(db.tag_def()).unwrap().tag_list_to_flags(list);
    assert!(parsed.is_complete(), "unknown tags in {list}");
    FragTagState::global(parsed.state)
}

/// `(fragment, tags, animations)` for every stored option, sorted.
fn summary(manager: &AnimationDatabaseManager, db: DatabaseId) -> Vec<(String, String, Vec<String>)> {
    let db = manager.database(db).unwrap();
    let tags = manager.tag_def(db.tag_def()).unwrap();
    let frags = manager.tag_def(db.frag_def()).unwrap();
    let mut out = Vec::new();
    for (id, entry) in db.entries() {
        for set in entry.tag_sets() {
            for option in &set.options {
                out.push((
                    frags.tag_name(id).unwrap().to_string(),
                    tags.flags_to_tag_list(set.tags.global_tags),
                    option.animation_names().map(String::from).collect(),
                ));
            }
        }
    }
    out.sort();
    out
}

// =============================================================================
// Load / save
// =============================================================================

#[test]
fn test_load_merges_the_sub_adb_tree() {
    let (_dir, mut manager) = setup();
    let db = manager.load("player.adb").unwrap();

    let names: Vec<String> = summary(&manager, db)
        .into_iter()
        .flat_map(|(_, _, anims)| anims)
        .collect();
    assert_eq!(names.len(), 4);
    for name in ["idle", "crouch_idle", "crouch_armed_idle", "move"] {
        assert!(names.iter().any(|n| n == name), "missing {name}");
    }

    let database = manager.database(db).unwrap();
    assert_eq!(database.blend_count(), 2);
    assert!(database.has_file("crouch_armed.adb"));
    assert_eq!(database.sub_adb_fragment_filters("move.adb"), &[1]);
}

#[test]
fn test_round_trip_with_sub_adb_tree() {
    let (dir, mut manager) = setup();
    let db = manager.load("player.adb").unwrap();
    let swim = global(&manager, db, "Swim");
    manager
        .add_fragment_entry(db, 2, swim, Fragment::single("swim_jump"))
        .unwrap();
    let before = summary(&manager, db);
    manager.save_database(db).unwrap();

    let mut reloaded = manager_in(dir.path());
    let again = reloaded.load("player.adb").unwrap();
    assert_eq!(summary(&reloaded, again), before);
    assert_eq!(reloaded.database(again).unwrap().blend_count(), 2);

    let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
    let player = read("player.adb");
    let crouch = read("crouch.adb");
    let crouch_armed = read("crouch_armed.adb");

    assert!(player.contains("swim_jump"));
    assert!(!player.contains("crouch_idle"));
    assert!(crouch.contains("\"crouch_idle\""));
    assert!(!crouch.contains("crouch_armed_idle"));
    assert!(crouch_armed.contains("crouch_armed_idle"));
    assert!(read("move.adb").contains("\"move\""));

    // Idle -> Move under Crouch belongs to the crouch file.
    assert!(crouch.contains("selectTime=\"0.5\""));
}

#[test]
fn test_any_to_any_blend_stays_at_the_root() {
    let (dir, mut manager) = setup();
    let db = manager.load("player.adb").unwrap();
    let crouch = global(&manager, db, "Crouch");
    let blend = FragmentBlend {
        select_time: 0.75,
        ..FragmentBlend::default()
    };
    manager
        .add_blend(db, FragmentBlendKey::ANY_TO_ANY, crouch, crouch, blend)
        .unwrap();
    manager.save_database(db).unwrap();

    let player = fs::read_to_string(dir.path().join("player.adb")).unwrap();
    let crouch_file = fs::read_to_string(dir.path().join("crouch.adb")).unwrap();
    assert!(player.contains("selectTime=\"0.75\""));
    assert!(player.contains("selectTime=\"0.25\""));
    assert!(!crouch_file.contains("selectTime=\"0.75\""));
}

#[test]
fn test_save_all_through_a_custom_writer() {
    struct Collect(Vec<String>);

    impl MannequinWriter for Collect {
        fn write(&mut self, filename: &str, _xml: &mannequin_xml::XmlNode) -> Result<(), mannequin_xml::XmlError> {
            self.0.push(filename.to_string());
            Ok(())
        }
    }

    let (_dir, mut manager) = setup();
    manager.load("player.adb").unwrap();
    let mut writer = Collect(Vec::new());
    assert!(manager.save_all(&mut writer).is_empty());
    writer.0.sort();
    assert_eq!(
        writer.0,
        vec!["crouch.adb", "crouch_armed.adb", "frags.xml", "move.adb", "player.adb", "tags.xml"]
    );
}

// =============================================================================
// Create / revert
// =============================================================================

#[test]
fn test_duplicate_create_is_rejected() {
    let (dir, mut manager) = setup();
    let db = manager.create("new.adb", "def.xml").unwrap();
    assert!(dir.path().join("new.adb").exists());
    assert_eq!(manager.database(db).unwrap().fragment_count(), 3);

    assert!(matches!(
        manager.create("NEW.adb", "def.xml"),
        Err(LoadError::AlreadyLoaded(_))
    ));
    assert_eq!(manager.loaded_databases(), vec![db]);

    manager.create_tag_definition("extra.xml").unwrap();
    assert!(matches!(
        manager.create_tag_definition("extra.xml"),
        Err(LoadError::AlreadyLoaded(_))
    ));
}

#[test]
fn test_overwrite_policy_keeps_the_handle() {
    let dir = TempDir::new().unwrap();
    write_files(dir.path(), &[("tags.xml", TAGS), ("frags.xml", FRAGS), ("def.xml", DEF)]);
    let mut manager = AnimationDatabaseManager::new(
        ManagerConfig::default()
            .with_root_dir(dir.path())
            .with_duplicate_policy(DuplicatePolicy::Overwrite),
    );
    let first = manager.create("new.adb", "def.xml").unwrap();
    let second = manager.create("new.adb", "def.xml").unwrap();
    assert_eq!(first, second);
    assert_eq!(manager.database_generation(first), Some(1));
}

#[test]
fn test_revert_restores_disk_state_behind_the_same_handle() {
    let (_dir, mut manager) = setup();
    let db = manager.load("player.adb").unwrap();
    let original = summary(&manager, db);

    let swim = global(&manager, db, "Swim");
    manager
        .add_fragment_entry(db, 2, swim, Fragment::single("swim_jump"))
        .unwrap();
    assert_ne!(summary(&manager, db), original);

    assert_eq!(manager.revert_database("player.adb").unwrap(), vec![db]);
    assert_eq!(manager.find_database("player.adb"), Some(db));
    assert_eq!(manager.database_generation(db), Some(1));
    assert_eq!(summary(&manager, db), original);
}

#[test]
fn test_reload_all_picks_up_disk_changes_behind_the_same_handles() {
    let (dir, mut manager) = setup();
    let def = manager.load_controller_def("def.xml").unwrap();
    let db = manager.load("player.adb").unwrap();
    let tags = manager.find_tag_def("tags.xml").unwrap();

    let walk = MOVE.replace("\"move\"", "\"walk\"");
    write_files(
        dir.path(),
        &[
            (
                "tags.xml",
                r#"<TagDefinition version="2"><Tag name="Crouch"/><Tag name="Armed"/><Tag name="Swim"/><Tag name="Prone"/></TagDefinition>"#,
            ),
            ("move.adb", walk.as_str()),
        ],
    );
    assert!(manager.reload_all().is_empty());

    assert_eq!(manager.find_tag_def("tags.xml"), Some(tags));
    assert_eq!(manager.find_controller_def("def.xml"), Some(def));
    assert_eq!(manager.find_database("player.adb"), Some(db));
    assert_eq!(manager.tag_def_generation(tags), Some(1));
    assert_eq!(manager.controller_def_generation(def), Some(1));
    assert_eq!(manager.database_generation(db), Some(1));

    assert!(manager.tag_def(tags).unwrap().find("Prone").is_some());
    let names: Vec<String> = summary(&manager, db)
        .into_iter()
        .flat_map(|(_, _, anims)| anims)
        .collect();
    assert!(names.iter().any(|n| n == "walk"));
    assert!(!names.iter().any(|n| n == "move"));
}

#[test]
fn test_reload_all_reports_files_that_failed() {
    let (dir, mut manager) = setup();
    let def = manager.load_controller_def("def.xml").unwrap();
    let db = manager.load("player.adb").unwrap();
    let before = summary(&manager, db);

    fs::remove_file(dir.path().join("def.xml")).unwrap();
    fs::remove_file(dir.path().join("player.adb")).unwrap();
    assert_eq!(manager.reload_all(), vec!["def.xml", "player.adb"]);

    // Failed reloads leave the cached resources as they were.
    assert!(manager.controller_def(def).is_some());
    assert_eq!(manager.controller_def_generation(def), Some(0));
    assert_eq!(summary(&manager, db), before);
}

// =============================================================================
// Propagation
// =============================================================================

#[test]
fn test_rename_propagates_through_imports() {
    let dir = TempDir::new().unwrap();
    write_files(
        dir.path(),
        &[
            ("Base.xml", r#"<TagDefinition><Tag name="Crouch"/></TagDefinition>"#),
            (
                "Sub.xml",
                r#"<TagDefinition><Imports><Import filename="Base.xml"/></Imports><Tag name="Prone"/></TagDefinition>"#,
            ),
        ],
    );
    let mut manager = manager_in(dir.path());
    let base = manager.load_tag_def("Base.xml").unwrap();
    let sub = manager.load_tag_def("Sub.xml").unwrap();

    let crc = hash::crc32_lowercase("Crouch");
    manager.rename_tag(sub, crc, "Kneel").unwrap();

    for id in [base, sub] {
        let def = manager.tag_def(id).unwrap();
        assert!(def.find("Kneel").is_some(), "{} not renamed", def.filename());
        assert!(def.find("Crouch").is_none());
    }
}

#[test]
fn test_rename_refuses_names_that_would_collide() {
    let (_dir, mut manager) = setup();
    let db = manager.load("player.adb").unwrap();
    let tags = manager.database(db).unwrap().tag_def();

    let result = manager.rename_tag(tags, hash::crc32_lowercase("Armed"), "Crouch");
    assert!(matches!(result, Err(RenameTagError::DuplicateName { .. })));
    let result = manager.rename_tag(tags, hash::crc32_lowercase("Swim"), "12 bad+x");
    assert_eq!(result, Err(RenameTagError::InvalidNameIdentifier));

    let names: Vec<&str> = manager.tag_def(tags).unwrap().tag_names().collect();
    assert_eq!(names, vec!["Crouch", "Armed", "Swim"]);
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<TagDefId>>,
}

impl MannequinListener for Recorder {
    fn on_tag_def_invalidated(&self, id: TagDefId, _def: &TagDefinition) {
        self.seen.lock().unwrap().push(id);
    }
}

#[test]
fn test_fragment_id_changes_propagate_to_every_dependent() {
    let (_dir, mut manager) = setup();
    let def = manager.load_controller_def("def.xml").unwrap();
    let db = manager.load("player.adb").unwrap();
    let frags = manager.find_tag_def("frags.xml").unwrap();

    let recorder = Arc::new(Recorder::default());
    let listener = manager.register_listener(recorder.clone());

    let fall = manager.create_fragment_id(frags, "Fall").unwrap();
    assert_eq!(fall, 3);
    assert_eq!(manager.controller_def(def).unwrap().fragment_defs.len(), 4);
    assert_eq!(manager.database(db).unwrap().fragment_count(), 4);

    // Removing Idle shifts Move down to 0 everywhere.
    manager.delete_fragment_id(frags, 0).unwrap();
    let database = manager.database(db).unwrap();
    assert_eq!(database.fragment_count(), 3);
    assert_eq!(database.sub_adb_fragment_filters("move.adb"), &[0]);
    let names: Vec<&str> = database.entry(0).unwrap().tag_sets()[0].options[0]
        .animation_names()
        .collect();
    assert_eq!(names, vec!["move"]);
    // The Idle -> Move blend went with Idle; any-to-any stays.
    assert_eq!(database.blend_count(), 1);

    assert_eq!(*recorder.seen.lock().unwrap(), vec![frags, frags]);
    assert!(manager.unregister_listener(listener));
    manager.rename_fragment_id(frags, 0, "Walk").unwrap();
    assert_eq!(recorder.seen.lock().unwrap().len(), 2);
}

#[test]
fn test_entries_land_in_the_owning_file_of_every_database() {
    let (_dir, mut manager) = setup();
    let player = manager.load("player.adb").unwrap();
    let crouch = manager.load("crouch.adb").unwrap();
    let state = global(&manager, player, "Crouch+Armed");

    let owner = {
        let db = manager.database(player).unwrap();
        Ownership::new(db, manager.tag_defs())
            .unwrap()
            .find_root_sub_adb(0, state.global_tags)
            .map(str::to_string)
    };
    assert_eq!(owner.as_deref(), Some("crouch_armed.adb"));

    // crouch.adb holds crouch_armed.adb as well.
    assert_eq!(
        manager.find_impacted_databases(player, 0, state.global_tags),
        vec![player, crouch]
    );
    let index = manager
        .add_fragment_entry(player, 0, state, Fragment::single("crouch_armed_idle_2"))
        .unwrap();
    assert_eq!(index, 1);
    let options = manager.database(crouch).unwrap().entry(0).unwrap().options(&state).unwrap();
    assert_eq!(options.len(), 2);
}

#[test]
fn test_snapshot_round_trip_discards_later_edits() {
    let (_dir, mut manager) = setup();
    let db = manager.load("player.adb").unwrap();
    let snapshot = manager.save_databases_snapshot();
    let original = summary(&manager, db);

    let swim = global(&manager, db, "Swim");
    manager
        .add_fragment_entry(db, 2, swim, Fragment::single("swim_jump"))
        .unwrap();
    manager.load_databases_snapshot(&snapshot);
    assert_eq!(summary(&manager, db), original);
}
