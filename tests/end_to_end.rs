mod common;

use common::{
    generation_of, init_tracing, request, start_runtime, wait_for_generation, wait_for_status,
};

use std::error::Error;
use std::time::Duration;

use preheat::router::{bind_public_socket, spawn_router};
use preheat::supervisor::RuntimeEvent;
use preheat::tree::SlotStatus;
use preheat_test_utils::builders::PlanFileBuilder;
use preheat_test_utils::fake_backend::SlotBehavior;

type TestResult = Result<(), Box<dyn Error>>;

/// The full preloader story on one tree:
///
/// boot ─┬─ data ── data_srv   (serves the contents of data.txt)
///       └─ code ── code_srv   (serves the contents of code.txt)
///
/// Requests hit the warm responses; replacing the file behind the code
/// branch swaps only that branch's responses; shutdown is clean.
#[tokio::test]
async fn warm_responses_follow_dependency_changes() -> TestResult {
    init_tracing();
    let tmp = tempfile::tempdir()?;
    let app = tmp.path().join("app");
    let socks = tmp.path().join("socks");
    std::fs::create_dir_all(&app)?;
    std::fs::create_dir_all(&socks)?;
    let sock = tmp.path().join("preheat.sock");

    let data_file = app.join("data.txt");
    let code_file = app.join("code.txt");
    let replacement = app.join("other-code.txt");
    std::fs::write(&data_file, "R1\n")?;
    std::fs::write(&code_file, "R2\n")?;
    std::fs::write(&replacement, "R3\n")?;

    let plan = PlanFileBuilder::new("true")
        .with_root("boot")
        .with_slot("data", "boot")
        .with_slot("data_srv", "data")
        .with_slot("code", "boot")
        .with_slot("code_srv", "code")
        .build();

    let behaviors = vec![
        (
            "data",
            SlotBehavior {
                deps: vec![data_file.clone()],
                ..Default::default()
            },
        ),
        (
            "code",
            SlotBehavior {
                deps: vec![code_file.clone()],
                ..Default::default()
            },
        ),
        (
            "data_srv",
            SlotBehavior {
                serve_from: Some(data_file.clone()),
                ..Default::default()
            },
        ),
        (
            "code_srv",
            SlotBehavior {
                serve_from: Some(code_file.clone()),
                ..Default::default()
            },
        ),
    ];
    let mut h = start_runtime(&plan, &socks, behaviors).await;

    let listener = bind_public_socket(&sock)?;
    let _router = spawn_router(listener, h.routes.clone(), plan.master.session_wait());

    for slot in ["boot", "data", "data_srv", "code", "code_srv"] {
        wait_for_status(&mut h.routes, slot, SlotStatus::Ready).await;
    }

    // Warm responses.
    assert_eq!(request(&sock, "data_srv").await?, "ok\nR1");
    assert_eq!(request(&sock, "code_srv").await?, "ok\nR2");

    // Give the directory watch a moment to be fully established.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Replace the file backing the code branch the way editors do.
    std::fs::rename(&replacement, &code_file)?;

    // Past the debounce window, the code branch is replaced...
    wait_for_generation(&mut h.routes, "code", 2).await;
    wait_for_generation(&mut h.routes, "code_srv", 2).await;
    assert_eq!(request(&sock, "code_srv").await?, "ok\nR3");

    // ...while the data branch still serves its original warm state.
    assert_eq!(generation_of(&h.routes, "data_srv"), 1);
    assert_eq!(request(&sock, "data_srv").await?, "ok\nR1");

    // Clean shutdown.
    h.events_tx.send(RuntimeEvent::ShutdownRequested).await?;
    let code = tokio::time::timeout(Duration::from_secs(5), h.runtime).await???;
    assert_eq!(code, 0);
    Ok(())
}
