use efm_core::id::NodeKey;
use efm_core::model::{GeometryHandle, Geometries};
use efm_sync::canvas::{Canvas, CanvasNodeId, NodeKind, NodePayload, Point};
use efm_sync::config::{CollisionPolicy, ConnectionRule, SyncConfig};
use efm_sync::memory::MemoryHost;
use efm_sync::session::Session;
use efm_sync::sync::EntityClass;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

// ─── Helpers ─────────────────────────────────────────────────────────────

/// Percent-encode the way the form's `encodeURIComponent` does.
fn encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-_.!~*'()".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

fn update_elements(rows: Value) -> String {
    let data = json!({ "GeomDict": { "Elements": rows } }).to_string();
    format!("updateelements:update?data={}", encode(&data))
}

fn update_materials(rows: Value) -> String {
    let data = json!({ "MatDict": { "Materials": rows } }).to_string();
    format!("updatematerials:update?data={}", encode(&data))
}

fn geometries(handles: &[u64]) -> Geometries {
    handles.iter().map(|&h| GeometryHandle(h)).collect()
}

fn managed_element(session: &Session, key: NodeKey) -> Option<CanvasNodeId> {
    session.sync_engine().managed(EntityClass::Elements).get(key)
}

fn managed_material(session: &Session, name: &str) -> Option<CanvasNodeId> {
    session
        .sync_engine()
        .managed(EntityClass::Materials)
        .get(NodeKey::material(name))
}

fn slider_value(host: &MemoryHost, id: CanvasNodeId) -> f64 {
    match host.canvas.payload(id) {
        Some(NodePayload::Slider(slider)) => slider.value,
        other => panic!("expected a slider payload, got {other:?}"),
    }
}

fn send(session: &mut Session, host: &mut MemoryHost, uri: &str) {
    session.handle_message(host, uri).unwrap();
}

// ─── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn first_element_creates_container_and_slider() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();

    let outcome = session
        .handle_message(
            &mut host,
            &update_elements(json!([{ "name": "Wall1", "thickness": 200, "geometries": [] }])),
        )
        .unwrap();

    assert!(outcome.store_changed);
    let container = host.canvas.node_named("Wall1").unwrap();
    assert_eq!(container.kind, NodeKind::GeometryContainer);
    let slider = host.canvas.node_named("Wall1_Thickness").unwrap();
    assert_eq!(slider.kind, NodeKind::Slider);
    assert_eq!(slider_value(&host, slider.id), 200.0);
    assert_eq!(
        session.sync_engine().managed(EntityClass::Elements).names(),
        vec!["Wall1", "Wall1_Thickness"]
    );
}

#[test]
fn form_update_keeps_picked_geometry_and_updates_in_place() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    host.queue_pick([GeometryHandle(1)]);
    send(&mut session, &mut host, "geometryupdate:geo?Wall1,200");

    let container = managed_element(&session, NodeKey::element("Wall1")).unwrap();
    let slider = managed_element(&session, NodeKey::slider("Wall1")).unwrap();
    assert_eq!(
        host.canvas.payload(container),
        Some(NodePayload::Geometry(geometries(&[1])))
    );
    let created_before = host.canvas.created_count();

    let outcome = session
        .handle_message(
            &mut host,
            &update_elements(json!([{ "name": "Wall1", "thickness": 250 }])),
        )
        .unwrap();

    let wall = session.document().element("Wall1").unwrap();
    assert_eq!(wall.thickness, 250.0);
    assert_eq!(wall.geometries, geometries(&[1]));
    assert!(outcome.sync.created.is_empty());
    assert_eq!(outcome.sync.updated, vec![NodeKey::slider("Wall1")]);
    assert_eq!(host.canvas.created_count(), created_before);
    assert_eq!(managed_element(&session, NodeKey::element("Wall1")), Some(container));
    assert_eq!(slider_value(&host, slider), 250.0);
}

#[test]
fn delete_element_removes_both_nodes() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
    );

    send(&mut session, &mut host, "deleteelement:delete?name=Wall1");

    assert!(session.document().element("Wall1").is_none());
    assert!(host.canvas.node_named("Wall1").is_none());
    assert!(host.canvas.node_named("Wall1_Thickness").is_none());
    assert!(session.sync_engine().managed(EntityClass::Elements).is_empty());
}

#[test]
fn delete_of_unknown_element_is_a_noop() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
    );
    let revision = session.store().revision();
    let recomputes = host.recomputes;

    let outcome = session
        .handle_message(&mut host, "deleteelement:delete?name=Ghost")
        .unwrap();

    assert!(!outcome.store_changed);
    assert_eq!(session.store().revision(), revision);
    assert_eq!(host.recomputes, recomputes);
}

#[test]
fn bulk_materials_update_drops_missing_materials() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_materials(json!([
            { "name": "M1", "E": "210000", "fc": 30 },
            { "name": "M2", "E": 33000 }
        ])),
    );
    assert!(managed_material(&session, "M2").is_some());

    send(
        &mut session,
        &mut host,
        &update_materials(json!([{ "name": "M1", "E": 200000 }])),
    );

    let names: Vec<&str> = session.document().material_names().collect();
    assert_eq!(names, vec!["M1"]);
    assert!(host.canvas.node_named("M2").is_none());
    assert!(managed_material(&session, "M2").is_none());
    let m1 = session.document().material("M1").unwrap();
    assert_eq!(m1.e, 200000.0);
    assert_eq!(m1.fc, 30.0);
}

#[test]
fn material_node_carries_default_color() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_materials(json!([{ "name": "S235", "Color": "", "FlowHypothesis": "Tresca" }])),
    );

    let id = managed_material(&session, "S235").unwrap();
    match host.canvas.payload(id) {
        Some(NodePayload::Material(definition)) => {
            assert_eq!(definition.color, "White");
            assert_eq!(definition.e, 0.0);
            assert_eq!(definition.flow_hypothesis.as_str(), "tresca");
        }
        other => panic!("expected a material payload, got {other:?}"),
    }
}

// ─── Properties ──────────────────────────────────────────────────────────

#[test]
fn full_replace_drops_missing_elements_and_their_nodes() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 100 },
            { "name": "B", "thickness": 120 }
        ])),
    );
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "A", "thickness": 100 }])),
    );

    let names: Vec<&str> = session.document().element_names().collect();
    assert_eq!(names, vec!["A"]);
    assert!(host.canvas.node_named("B").is_none());
    assert!(host.canvas.node_named("B_Thickness").is_none());
    assert_eq!(
        session.sync_engine().managed(EntityClass::Elements).names(),
        vec!["A", "A_Thickness"]
    );
}

#[test]
fn same_list_twice_is_idempotent() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    let message = update_elements(json!([
        { "name": "A", "thickness": 100 },
        { "name": "B", "thickness": 120 }
    ]));

    send(&mut session, &mut host, &message);
    let document = session.document().clone();
    let managed = session.sync_engine().managed(EntityClass::Elements).clone();
    let revision = session.store().revision();

    let outcome = session.handle_message(&mut host, &message).unwrap();

    assert_eq!(session.document(), &document);
    assert_eq!(session.store().revision(), revision);
    assert_eq!(session.sync_engine().managed(EntityClass::Elements), &managed);
    assert!(!outcome.sync.changed());
    assert_eq!(host.canvas.len(), 4);
    assert_eq!(host.canvas.deleted_count(), 0);
}

#[test]
fn rename_carries_geometry_to_new_nodes() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    host.queue_pick([GeometryHandle(4), GeometryHandle(5)]);
    send(&mut session, &mut host, "geometryupdate:geo?A,150");
    let old_container = managed_element(&session, NodeKey::element("A")).unwrap();

    let outcome = session.rename_element(&mut host, "A", "A2").unwrap();

    assert_eq!(outcome.sync.deleted, vec![NodeKey::element("A"), NodeKey::slider("A")]);
    assert!(host.canvas.node(old_container).is_none());
    assert!(managed_element(&session, NodeKey::element("A")).is_none());

    let container = managed_element(&session, NodeKey::element("A2")).unwrap();
    let slider = managed_element(&session, NodeKey::slider("A2")).unwrap();
    assert_eq!(
        host.canvas.payload(container),
        Some(NodePayload::Geometry(geometries(&[4, 5])))
    );
    assert_eq!(slider_value(&host, slider), 150.0);
}

#[test]
fn rename_onto_existing_name_is_refused() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 100 },
            { "name": "B", "thickness": 120 }
        ])),
    );
    assert!(session.rename_element(&mut host, "A", "B").is_err());
    assert_eq!(session.document().element_names().count(), 2);
}

// ─── Collisions ──────────────────────────────────────────────────────────

#[test]
fn unmanaged_name_collision_is_skipped() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    let foreign = host
        .canvas
        .add_external(NodeKind::Slider, "Wall1_Thickness", Point::new(10.0, 10.0));

    let outcome = session
        .handle_message(
            &mut host,
            &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
        )
        .unwrap();

    assert_eq!(outcome.sync.conflicts, vec![NodeKey::slider("Wall1")]);
    assert_eq!(host.canvas.payload(foreign), Some(NodePayload::Empty));
    assert_eq!(host.canvas.count_named("Wall1_Thickness"), 1);
    assert!(managed_element(&session, NodeKey::slider("Wall1")).is_none());
    assert!(managed_element(&session, NodeKey::element("Wall1")).is_some());

    // Deleting the element must not touch the foreign node either.
    send(&mut session, &mut host, "deleteelement:delete?name=Wall1");
    assert!(host.canvas.node(foreign).is_some());
}

#[test]
fn adopt_policy_takes_over_matching_node() {
    let config = SyncConfig {
        collision: CollisionPolicy::Adopt,
        ..SyncConfig::default()
    };
    let mut session = Session::new(config);
    let mut host = MemoryHost::new();
    let foreign = host
        .canvas
        .add_external(NodeKind::Slider, "Wall1_Thickness", Point::new(10.0, 10.0));
    let mismatched = host
        .canvas
        .add_external(NodeKind::Other, "Wall1", Point::new(10.0, 60.0));

    let outcome = session
        .handle_message(
            &mut host,
            &update_elements(json!([{ "name": "Wall1", "thickness": 40 }])),
        )
        .unwrap();

    assert_eq!(outcome.sync.adopted, vec![NodeKey::slider("Wall1")]);
    assert_eq!(outcome.sync.conflicts, vec![NodeKey::element("Wall1")]);
    assert_eq!(managed_element(&session, NodeKey::slider("Wall1")), Some(foreign));
    assert_eq!(slider_value(&host, foreign), 40.0);
    assert_eq!(host.canvas.position(foreign), Some(Point::new(10.0, 10.0)));
    assert_eq!(host.canvas.payload(mismatched), Some(NodePayload::Empty));
}

// ─── Picks, placement, wiring ────────────────────────────────────────────

#[test]
fn cancelled_pick_keeps_geometry_but_updates_thickness() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    host.queue_pick([GeometryHandle(1)]);
    send(&mut session, &mut host, "geometryupdate:geo?Wall1,200");

    host.queue_cancel();
    send(&mut session, &mut host, "geometryupdate:geo?Wall1,300");

    let wall = session.document().element("Wall1").unwrap();
    assert_eq!(wall.thickness, 300.0);
    assert_eq!(wall.geometries, geometries(&[1]));
}

#[test]
fn cancelled_pick_for_new_element_starts_without_geometry() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(&mut session, &mut host, "geometryupdate:geo?Slab,250");

    let slab = session.document().element("Slab").unwrap();
    assert_eq!(slab.thickness, 250.0);
    assert!(slab.geometries.is_empty());
    assert!(host.canvas.node_named("Slab").is_some());
}

#[test]
fn unavailable_geometry_falls_back_to_empty_container() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    host.canvas.make_unavailable(GeometryHandle(9));
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "Wall2", "thickness": 80 }])),
    );
    host.queue_pick([GeometryHandle(9)]);

    let outcome = session
        .handle_message(&mut host, "geometryupdate:geo?Wall1,200")
        .unwrap();

    assert_eq!(outcome.sync.fallbacks, vec![NodeKey::element("Wall1")]);
    let container = managed_element(&session, NodeKey::element("Wall1")).unwrap();
    assert_eq!(
        host.canvas.payload(container),
        Some(NodePayload::Geometry(Geometries::new()))
    );
    assert_eq!(
        session.document().element("Wall1").unwrap().geometries,
        geometries(&[9])
    );
    assert!(managed_element(&session, NodeKey::slider("Wall1")).is_some());
    assert!(managed_element(&session, NodeKey::element("Wall2")).is_some());
}

#[test]
fn new_nodes_go_below_the_lowest_node() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    host.canvas
        .add_external(NodeKind::Other, "Panel", Point::new(0.0, 700.0));

    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 10 },
            { "name": "B", "thickness": 20 }
        ])),
    );

    let position = |name: &str| host.canvas.node_named(name).map(|n| n.position);
    assert_eq!(position("A"), Some(Point::new(900.0, 800.0)));
    assert_eq!(position("B"), Some(Point::new(900.0, 900.0)));
    assert_eq!(position("A_Thickness"), Some(Point::new(1050.0, 760.0)));
    assert_eq!(position("B_Thickness"), Some(Point::new(1050.0, 820.0)));
}

#[test]
fn gaps_left_by_deletions_are_not_compacted() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 10 },
            { "name": "B", "thickness": 20 },
            { "name": "C", "thickness": 30 }
        ])),
    );
    let position = |host: &MemoryHost, name: &str| host.canvas.node_named(name).map(|n| n.position);
    assert_eq!(position(&host, "B"), Some(Point::new(900.0, 300.0)));
    assert_eq!(position(&host, "C"), Some(Point::new(900.0, 400.0)));

    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 10 },
            { "name": "C", "thickness": 30 },
            { "name": "D", "thickness": 40 }
        ])),
    );

    assert_eq!(position(&host, "B"), None);
    assert_eq!(position(&host, "A"), Some(Point::new(900.0, 200.0)));
    assert_eq!(position(&host, "C"), Some(Point::new(900.0, 400.0)));
    assert_eq!(position(&host, "C_Thickness"), Some(Point::new(1050.0, 320.0)));
    assert_eq!(position(&host, "D"), Some(Point::new(900.0, 500.0)));
    assert_eq!(position(&host, "D_Thickness"), Some(Point::new(1050.0, 460.0)));
}

#[test]
fn existing_nodes_are_never_moved() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "A", "thickness": 10 }])),
    );
    let a = host.canvas.node_named("A").unwrap().position;

    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 11 },
            { "name": "B", "thickness": 20 }
        ])),
    );

    assert_eq!(host.canvas.node_named("A").unwrap().position, a);
    assert!(host.canvas.node_named("B").unwrap().position.y > a.y);
}

#[test]
fn connection_rules_wire_once() {
    let config = SyncConfig {
        connections: vec![ConnectionRule {
            source: "Wall1".into(),
            source_output: 0,
            target: "Analysis".into(),
            target_input: 1,
        }],
        ..SyncConfig::default()
    };
    let mut session = Session::new(config);
    let mut host = MemoryHost::new();
    let analysis = host
        .canvas
        .add_external(NodeKind::Other, "Analysis", Point::new(1400.0, 0.0));

    let first = session
        .handle_message(
            &mut host,
            &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
        )
        .unwrap();
    let wall = managed_element(&session, NodeKey::element("Wall1")).unwrap();
    assert_eq!(first.sync.wired, 1);
    assert!(host.canvas.is_connected(wall, 0, analysis, 1));

    let second = session.resync(&mut host);
    assert_eq!(second.sync.wired, 0);
    assert_eq!(host.canvas.wires().len(), 1);
}

// ─── Recompute, history, canvas edits ────────────────────────────────────

#[test]
fn one_recompute_per_event() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 10 },
            { "name": "B", "thickness": 20 },
            { "name": "C", "thickness": 30 }
        ])),
    );
    assert_eq!(host.recomputes, 1);

    send(&mut session, &mut host, "sliderupdate:slider?A_Thickness=15");
    assert_eq!(host.recomputes, 2);
}

#[test]
fn rejected_message_leaves_everything_alone() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();

    assert!(session.handle_message(&mut host, "zoomcanvas:z?level=3").is_err());
    assert!(session
        .handle_message(&mut host, "sliderupdate:slider?A_Thickness=thick")
        .is_err());

    assert_eq!(session.store().revision(), 0);
    assert_eq!(host.recomputes, 0);
    assert!(host.canvas.is_empty());
}

#[test]
fn thickness_slider_message_updates_store_and_canvas() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
    );

    send(&mut session, &mut host, "sliderupdate:slider?Wall1_Thickness=120");

    assert_eq!(session.document().element("Wall1").unwrap().thickness, 120.0);
    let slider = managed_element(&session, NodeKey::slider("Wall1")).unwrap();
    assert_eq!(slider_value(&host, slider), 120.0);
}

#[test]
fn free_slider_is_kept_as_scalar() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(&mut session, &mut host, "sliderupdate:slider?windLoad=1.5");

    assert_eq!(session.document().scalars.get("windLoad"), Some(&1.5));
    assert!(host.canvas.is_empty());
    assert_eq!(host.recomputes, 1);
}

#[test]
fn undo_and_redo_restore_document_and_canvas() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "A", "thickness": 10 }])),
    );
    send(
        &mut session,
        &mut host,
        &update_elements(json!([
            { "name": "A", "thickness": 10 },
            { "name": "B", "thickness": 20 }
        ])),
    );

    session.undo(&mut host).unwrap();
    assert_eq!(session.document().element_names().collect::<Vec<_>>(), vec!["A"]);
    assert!(host.canvas.node_named("B").is_none());

    session.redo(&mut host).unwrap();
    assert_eq!(session.document().element_names().collect::<Vec<_>>(), vec!["A", "B"]);
    assert!(host.canvas.node_named("B_Thickness").is_some());
    assert!(session.redo(&mut host).is_none());
}

#[test]
fn dragged_slider_flows_back_to_store_and_form() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
    );
    assert!(host.outbox.is_empty());
    let slider = managed_element(&session, NodeKey::slider("Wall1")).unwrap();
    host.canvas.set_slider_value(slider, 80.0).unwrap();

    let outcome = session.handle_canvas_change(&mut host);

    assert!(outcome.store_changed);
    assert_eq!(session.document().element("Wall1").unwrap().thickness, 80.0);
    assert_eq!(
        host.pushed_events(),
        vec!["elementsLoaded", "materialDataLoaded", "materialsLoaded"]
    );
    assert_eq!(host.recomputes, 2);

    // Nothing moved since: no further edits.
    assert_eq!(session.handle_canvas_change(&mut host), Default::default());
}

#[test]
fn teardown_removes_only_managed_nodes() {
    let mut session = Session::new(SyncConfig::default());
    let mut host = MemoryHost::new();
    let panel = host
        .canvas
        .add_external(NodeKind::Other, "Panel", Point::new(0.0, 0.0));
    send(
        &mut session,
        &mut host,
        &update_elements(json!([{ "name": "Wall1", "thickness": 200 }])),
    );
    send(&mut session, &mut host, &update_materials(json!([{ "name": "M1" }])));

    assert_eq!(session.teardown(&mut host), 3);
    assert_eq!(host.canvas.len(), 1);
    assert!(host.canvas.node(panel).is_some());
    assert!(session.sync_engine().managed(EntityClass::Materials).is_empty());
}
