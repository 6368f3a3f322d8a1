//! Integration tests for MissionPatchingService
//!
//! These tests verify, against missions written to a temporary directory:
//! - Slot matching outcomes and reports for complete, short and unknown units
//! - Curator and player caps
//! - Failed runs leave the mission file byte-identical
//! - Only identity lines change and the line count is preserved
//! - Mission name resolution (`name` and `name.world`)
//! - Concurrent runs against a shared service

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use sqmpatch::models::{Account, HierarchySnapshot, PatcherSettings, Rank, Unit};
use sqmpatch::services::{MissionPatchingService, PatchError, StaticHierarchyLoader};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn create_missions_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let missions = Utf8PathBuf::try_from(temp_dir.path().join("missions")).unwrap();
    fs::create_dir_all(&missions).unwrap();
    (temp_dir, missions)
}

fn write_mission(missions: &Utf8Path, directory: &str, text: &str) -> Utf8PathBuf {
    let dir = missions.join(directory);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("mission.sqm");
    fs::write(&path, text).unwrap();
    path
}

/// Mission with one group per `(callsign, slots)` and `curators` curator
/// modules, indented with tabs and CRLF line endings like the editor writes.
fn mission_text(groups: &[(&str, usize)], curators: usize) -> String {
    let mut items = Vec::new();
    for (callsign, slots) in groups {
        let mut body = format!(
            "\t\t\tdataType=\"Group\";\n\t\t\tside=\"West\";\n\t\t\tcallsign=\"{callsign}\";\n\t\t\tclass Entities\n\t\t\t{{\n\t\t\t\titems={slots};\n"
        );
        for slot in 0..*slots {
            body.push_str(&format!(
                "\t\t\t\tclass Item{slot}\n\t\t\t\t{{\n\t\t\t\t\tdataType=\"Object\";\n\t\t\t\t\tclass PositionInfo\n\t\t\t\t\t{{\n\t\t\t\t\t\tposition[]={{1024.5,5.1,2048.25}};\n\t\t\t\t\t}};\n\t\t\t\t\tside=\"West\";\n\t\t\t\t\tclass Attributes\n\t\t\t\t\t{{\n\t\t\t\t\t\trank=\"PRIVATE\";\n\t\t\t\t\t\tdescription=\"Rifleman@{callsign}\";\n\t\t\t\t\t\tisPlayable=1;\n\t\t\t\t\t}};\n\t\t\t\t\tid={slot};\n\t\t\t\t\ttype=\"B_Soldier_F\";\n\t\t\t\t}};\n"
            ));
        }
        body.push_str("\t\t\t};\n");
        items.push(body);
    }
    for curator in 0..curators {
        items.push(format!(
            "\t\t\tdataType=\"Logic\";\n\t\t\tclass Attributes\n\t\t\t{{\n\t\t\t\tdescription=\"Zeus {curator}\";\n\t\t\t}};\n\t\t\tid={};\n\t\t\ttype=\"ModuleCurator_F\";\n",
            100 + curator
        ));
    }

    let mut text = format!(
        "version=54;\nclass EditorData\n{{\n\tmoveGridStep=1;\n}};\nclass Mission\n{{\n\tclass Intel\n\t{{\n\t\tbriefingName=\"Operation Test\";\n\t}};\n\tclass Entities\n\t{{\n\t\titems={};\n",
        items.len()
    );
    for (index, body) in items.iter().enumerate() {
        text.push_str(&format!("\t\tclass Item{index}\n\t\t{{\n{body}\t\t}};\n"));
    }
    text.push_str("\t};\n};\n");
    text.replace('\n', "\r\n")
}

fn ranks() -> Vec<Rank> {
    [
        ("Sergeant", "Sgt", "SERGEANT"),
        ("Corporal", "Cpl", "CORPORAL"),
        ("Private", "Pte", "PRIVATE"),
    ]
    .into_iter()
    .map(|(name, abbreviation, game_rank)| Rank {
        name: name.to_string(),
        abbreviation: abbreviation.to_string(),
        game_rank: Some(game_rank.to_string()),
    })
    .collect()
}

/// Flat roster with one unit per `(callsign, members)`.
fn roster(units: &[(&str, usize)]) -> HierarchySnapshot {
    let mut roster_units = Vec::new();
    let mut accounts = Vec::new();
    for (callsign, members) in units {
        let ids: Vec<String> = (0..*members).map(|m| format!("{callsign}/{m}")).collect();
        for (position, id) in ids.iter().enumerate() {
            accounts.push(Account {
                id: id.clone(),
                name: format!("Member{position}"),
                rank: Some(if position == 0 { "Corporal" } else { "Private" }.to_string()),
            });
        }
        roster_units.push(Unit {
            id: callsign.to_string(),
            name: format!("Unit {callsign}"),
            callsign: callsign.to_string(),
            parent: None,
            members: ids,
            roles: IndexMap::new(),
            object_class: None,
        });
    }
    HierarchySnapshot::new(roster_units, ranks(), accounts).unwrap()
}

fn service(missions: &Utf8Path, snapshot: HierarchySnapshot) -> MissionPatchingService {
    service_with(missions, snapshot, PatcherSettings::default())
}

fn service_with(
    missions: &Utf8Path,
    snapshot: HierarchySnapshot,
    settings: PatcherSettings,
) -> MissionPatchingService {
    let settings = PatcherSettings {
        missions_dir: missions.to_path_buf(),
        ..settings
    };
    MissionPatchingService::new(settings, Arc::new(StaticHierarchyLoader::new(snapshot)))
}

fn line_count(text: &str) -> usize {
    text.split_inclusive('\n').count()
}

#[tokio::test]
async fn test_complete_unit_fills_every_slot() {
    let (_temp_dir, missions) = create_missions_dir();
    let original = mission_text(&[("1-1-A", 3)], 0);
    let path = write_mission(&missions, "op_alpha.Altis", &original);

    let result = service(&missions, roster(&[("1-1-A", 3)]))
        .patch_mission_file("op_alpha")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.player_count, 3);
    assert!(result.reports.is_empty(), "{:?}", result.reports);

    let patched = fs::read_to_string(&path).unwrap();
    assert_eq!(line_count(&patched), line_count(&original));
    assert!(patched.contains("description=\"Cpl.Member0\";\r\n"));
    assert!(patched.contains("description=\"Pte.Member1\";\r\n"));
    assert!(patched.contains("description=\"Pte.Member2\";\r\n"));
    assert!(patched.contains("rank=\"CORPORAL\";\r\n"));
    assert!(!patched.contains("Rifleman@"));
}

#[tokio::test]
async fn test_short_unit_leaves_slots_empty() {
    let (_temp_dir, missions) = create_missions_dir();
    let path = write_mission(&missions, "op_bravo", &mission_text(&[("2-1-B", 5)], 0));

    let result = service(&missions, roster(&[("2-1-B", 3)]))
        .patch_mission_file("op_bravo")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.player_count, 3);
    assert_eq!(result.warnings().count(), 2);
    assert_eq!(result.errors().count(), 0);

    let patched = fs::read_to_string(&path).unwrap();
    assert_eq!(patched.matches("description=\"Rifleman@2-1-B\"").count(), 2);
}

#[tokio::test]
async fn test_unknown_callsign_is_reported_per_slot() {
    let (_temp_dir, missions) = create_missions_dir();
    let original = mission_text(&[("9-9-Z", 4)], 0);
    let path = write_mission(&missions, "op_charlie", &original);

    let result = service(&missions, roster(&[("1-1-A", 3)]))
        .patch_mission_file("op_charlie")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.player_count, 0);
    assert_eq!(result.warnings().count(), 4);
    assert!(result.reports.iter().all(|r| r.detail.contains("9-9-Z")));

    // Nothing assigned, nothing written.
    assert_eq!(fs::read(&path).unwrap(), original.as_bytes());
}

#[tokio::test]
async fn test_broken_mission_is_left_untouched() {
    let (_temp_dir, missions) = create_missions_dir();
    let text = mission_text(&[("1-1-A", 2)], 0);
    // Drop the brace closing `class Mission`.
    let broken = text.strip_suffix("};\r\n").unwrap().to_string();
    let path = write_mission(&missions, "op_delta", &broken);

    let result = service(&missions, roster(&[("1-1-A", 2)]))
        .patch_mission_file("op_delta")
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.reports.len(), 1);
    assert_eq!(result.errors().count(), 1);
    assert_eq!(result.player_count, 0);
    assert_eq!(fs::read(&path).unwrap(), broken.as_bytes());
}

#[tokio::test]
async fn test_curators_capped_at_configured_maximum() {
    let (_temp_dir, missions) = create_missions_dir();
    let path = write_mission(&missions, "op_echo", &mission_text(&[], 6));
    let settings = PatcherSettings {
        max_curators: 4,
        ..PatcherSettings::default()
    };

    let result = service_with(&missions, roster(&[("Curator", 6)]), settings)
        .patch_mission_file("op_echo")
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.player_count, 4);
    assert_eq!(result.warnings().count(), 2);
    assert!(result.reports.iter().all(|r| r.title == "Curator limit reached"));

    let patched = fs::read_to_string(&path).unwrap();
    assert_eq!(patched.matches("description=\"Zeus").count(), 2);
}

#[tokio::test]
async fn test_unmatched_lines_are_byte_identical() {
    let (_temp_dir, missions) = create_missions_dir();
    let original = mission_text(&[("1-1-A", 2), ("2-1-B", 2)], 1);
    let path = write_mission(&missions, "op_foxtrot.Stratis", &original);

    let result = service(&missions, roster(&[("1-1-A", 2)]))
        .patch_mission_file("op_foxtrot.Stratis")
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.player_count, 2);

    let patched = fs::read_to_string(&path).unwrap();
    let before: Vec<&str> = original.split_inclusive('\n').collect();
    let after: Vec<&str> = patched.split_inclusive('\n').collect();
    assert_eq!(before.len(), after.len());

    let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
    assert!(!changed.is_empty());
    for index in changed {
        let line = after[index].trim_start();
        assert!(
            line.starts_with("description=") || line.starts_with("rank="),
            "unexpected change at line {}: {}",
            index + 1,
            after[index]
        );
        assert!(after[index].ends_with("\r\n"));
    }
}

#[tokio::test]
async fn test_second_run_is_stable() {
    let (_temp_dir, missions) = create_missions_dir();
    let path = write_mission(&missions, "op_golf", &mission_text(&[("1-1-A", 3)], 0));
    let service = service(&missions, roster(&[("1-1-A", 3)]));

    service.patch_mission_file("op_golf").await.unwrap();
    let first = fs::read(&path).unwrap();
    let result = service.patch_mission_file("op_golf").await.unwrap();
    let second = fs::read(&path).unwrap();

    assert!(result.success);
    assert_eq!(result.player_count, 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_mission_name_resolution() {
    let (_temp_dir, missions) = create_missions_dir();
    write_mission(&missions, "op_hotel.Altis", &mission_text(&[], 0));
    write_mission(&missions, "op_india.Altis", &mission_text(&[], 0));
    write_mission(&missions, "op_india.Tanoa", &mission_text(&[], 0));
    fs::create_dir_all(missions.join("op_juliet")).unwrap();

    let service = service(&missions, roster(&[]));

    let location = service.locate_mission("OP_HOTEL").await.unwrap();
    assert_eq!(location.directory, missions.join("op_hotel.Altis"));
    assert!(location.description_path.is_none());

    match service.locate_mission("op_india").await {
        Err(PatchError::AmbiguousMission { candidates, .. }) => {
            assert_eq!(candidates, vec!["op_india.Altis", "op_india.Tanoa"]);
        }
        other => panic!("expected ambiguous mission, got {other:?}"),
    }
    assert!(service.locate_mission("op_india.Tanoa").await.is_ok());

    // Directory without a mission file.
    assert!(matches!(
        service.patch_mission_file("op_juliet").await,
        Err(PatchError::NotFound(_))
    ));
    assert!(matches!(
        service.patch_mission_file("op_kilo").await,
        Err(PatchError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_description_ext_is_detected() {
    let (_temp_dir, missions) = create_missions_dir();
    let sqm = write_mission(&missions, "op_lima", &mission_text(&[], 0));
    let description = sqm.parent().unwrap().join("description.ext");
    fs::write(&description, "onLoadName = \"Lima\";\n").unwrap();

    let location = service(&missions, roster(&[]))
        .locate_mission("op_lima")
        .await
        .unwrap();
    assert_eq!(location.description_path, Some(description));
}

#[tokio::test]
async fn test_missing_roster_file_is_an_error() {
    let (_temp_dir, missions) = create_missions_dir();
    write_mission(&missions, "op_mike", &mission_text(&[("1-1-A", 1)], 0));

    let settings = PatcherSettings {
        missions_dir: missions.clone(),
        ..PatcherSettings::default()
    };
    let loader = sqmpatch::services::YamlHierarchyLoader::new(missions.join("missing.yaml"));
    let result = MissionPatchingService::new(settings, Arc::new(loader))
        .patch_mission_file("op_mike")
        .await;

    assert!(matches!(result, Err(PatchError::Hierarchy(_))));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_interfere() {
    let (_temp_dir, missions) = create_missions_dir();
    let names: Vec<String> = (0..6).map(|i| format!("op_multi_{i}")).collect();
    for (index, name) in names.iter().enumerate() {
        write_mission(&missions, name, &mission_text(&[("1-1-A", index + 1)], 0));
    }
    let service = Arc::new(service(&missions, roster(&[("1-1-A", 3)])));

    let mut tasks = tokio::task::JoinSet::new();
    for (index, name) in names.iter().cloned().enumerate() {
        let service = Arc::clone(&service);
        tasks.spawn(async move { (index, service.patch_mission_file(&name).await.unwrap()) });
    }

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.unwrap();
        let slots = index + 1;
        assert!(result.success);
        assert_eq!(result.player_count, slots.min(3));
        assert_eq!(result.warnings().count(), slots.saturating_sub(3));
    }
}
