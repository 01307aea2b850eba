mod common;

use common::{generation_of, init_tracing, start_runtime, wait_for_generation, wait_for_status};

use std::error::Error;
use std::time::Duration;

use preheat::supervisor::RuntimeEvent;
use preheat::tree::SlotStatus;
use preheat_test_utils::builders::PlanFileBuilder;
use preheat_test_utils::fake_backend::SlotBehavior;

type TestResult = Result<(), Box<dyn Error>>;

/// Filesystem events can take a moment to start flowing after a watch is
/// established.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

fn deps_behavior(path: &std::path::Path) -> SlotBehavior {
    SlotBehavior {
        deps: vec![path.to_path_buf()],
        ..Default::default()
    }
}

#[tokio::test]
async fn file_change_restarts_only_the_depending_subtree() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let app = tmp.path().join("app");
    let socks = tmp.path().join("socks");
    std::fs::create_dir_all(&app)?;
    std::fs::create_dir_all(&socks)?;

    let code_file = app.join("code.txt");
    let data_file = app.join("data.txt");
    std::fs::write(&code_file, "one")?;
    std::fs::write(&data_file, "one")?;

    let plan = PlanFileBuilder::new("true")
        .with_root("boot")
        .with_slot("code", "boot")
        .with_slot("code_srv", "code")
        .with_slot("data", "boot")
        .with_slot("data_srv", "data")
        .build();

    let behaviors = vec![
        ("code", deps_behavior(&code_file)),
        ("data", deps_behavior(&data_file)),
    ];
    let mut h = start_runtime(&plan, &socks, behaviors).await;

    for slot in ["boot", "code", "code_srv", "data", "data_srv"] {
        wait_for_status(&mut h.routes, slot, SlotStatus::Ready).await;
    }
    settle().await;

    std::fs::write(&code_file, "two")?;

    // The whole code branch is replaced...
    wait_for_generation(&mut h.routes, "code", 2).await;
    wait_for_generation(&mut h.routes, "code_srv", 2).await;

    // ...while every other slot keeps its process identity.
    assert_eq!(generation_of(&h.routes, "boot"), 1);
    assert_eq!(generation_of(&h.routes, "data"), 1);
    assert_eq!(generation_of(&h.routes, "data_srv"), 1);

    h.runtime.abort();
    Ok(())
}

#[tokio::test]
async fn rename_style_replace_triggers_a_restart() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let app = tmp.path().join("app");
    let socks = tmp.path().join("socks");
    std::fs::create_dir_all(&app)?;
    std::fs::create_dir_all(&socks)?;

    let code_file = app.join("code.txt");
    let replacement = app.join("other-code.txt");
    std::fs::write(&code_file, "one")?;
    std::fs::write(&replacement, "two")?;

    let plan = PlanFileBuilder::new("true")
        .with_root("boot")
        .with_slot("code", "boot")
        .build();

    let behaviors = vec![("code", deps_behavior(&code_file))];
    let mut h = start_runtime(&plan, &socks, behaviors).await;
    wait_for_status(&mut h.routes, "code", SlotStatus::Ready).await;
    settle().await;

    // Editors often save by writing a sibling file and renaming it over
    // the original; the directory watch sees it.
    std::fs::rename(&replacement, &code_file)?;

    wait_for_generation(&mut h.routes, "code", 2).await;

    h.runtime.abort();
    Ok(())
}

#[tokio::test]
async fn repeated_changes_keep_restarting_after_reregistration() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let app = tmp.path().join("app");
    let socks = tmp.path().join("socks");
    std::fs::create_dir_all(&app)?;
    std::fs::create_dir_all(&socks)?;

    let code_file = app.join("code.txt");
    std::fs::write(&code_file, "one")?;

    let plan = PlanFileBuilder::new("true")
        .with_root("boot")
        .with_slot("code", "boot")
        .build();

    let behaviors = vec![("code", deps_behavior(&code_file))];
    let mut h = start_runtime(&plan, &socks, behaviors).await;
    wait_for_status(&mut h.routes, "code", SlotStatus::Ready).await;
    settle().await;

    // Each replacement generation re-registers the same dependency, so a
    // second change must restart again.
    std::fs::write(&code_file, "two")?;
    wait_for_generation(&mut h.routes, "code", 2).await;
    settle().await;

    std::fs::write(&code_file, "three")?;
    wait_for_generation(&mut h.routes, "code", 3).await;

    h.runtime.abort();
    Ok(())
}

#[tokio::test]
async fn crash_respawns_the_slot_without_touching_other_branches() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let plan = PlanFileBuilder::new("true")
        .with_root("boot")
        .with_slot("code_srv", "boot")
        .with_slot("data_srv", "boot")
        .build();

    let mut h = start_runtime(&plan, tmp.path(), vec![]).await;
    for slot in ["boot", "code_srv", "data_srv"] {
        wait_for_status(&mut h.routes, slot, SlotStatus::Ready).await;
    }

    // Simulate an unexpected death of data_srv's process.
    h.events_tx
        .send(RuntimeEvent::SlotExited {
            slot: "data_srv".to_string(),
            generation: generation_of(&h.routes, "data_srv"),
            code: Some(9),
        })
        .await?;

    wait_for_generation(&mut h.routes, "data_srv", 2).await;
    assert_eq!(generation_of(&h.routes, "code_srv"), 1);
    assert_eq!(generation_of(&h.routes, "boot"), 1);

    h.runtime.abort();
    Ok(())
}

#[tokio::test]
async fn crash_storm_surfaces_a_permanently_dead_slot() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let plan = PlanFileBuilder::new("true")
        .with_root("boot")
        .with_slot("code_srv", "boot")
        .with_retry_budget(1)
        .build();

    let mut h = start_runtime(&plan, tmp.path(), vec![]).await;
    wait_for_status(&mut h.routes, "code_srv", SlotStatus::Ready).await;

    // First crash: respawned.
    h.events_tx
        .send(RuntimeEvent::SlotExited {
            slot: "code_srv".to_string(),
            generation: 1,
            code: Some(9),
        })
        .await?;
    wait_for_generation(&mut h.routes, "code_srv", 2).await;

    // Second crash within the window exceeds the budget of 1.
    h.events_tx
        .send(RuntimeEvent::SlotExited {
            slot: "code_srv".to_string(),
            generation: 2,
            code: Some(9),
        })
        .await?;
    wait_for_status(&mut h.routes, "code_srv", SlotStatus::Dead).await;

    // No third process is ever spawned.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let actions = h.actions.lock().unwrap().clone();
    let spawned =
        preheat_test_utils::fake_backend::FakeBackend::spawned_generations(&actions, "code_srv");
    assert_eq!(spawned, vec![1, 2]);

    h.runtime.abort();
    Ok(())
}
