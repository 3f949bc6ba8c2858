//! Unit tests for module graph validation and ordering.

use rstest::{fixture, rstest};

use super::*;
use crate::discovery::HardwareDevice;

#[fixture]
fn full_layout() -> StackLayout {
    StackLayout::new("dahdi")
        .with_driver_modules(["wct4xxp", "wctdm24xxp"])
        .with_echocan_modules(["dahdi_echocan_mg2"])
        .with_side_effect_modules(["dahdi_voicebus"])
        .with_wan(WanStack::new("wanrouter", "wanpipe"))
}

fn position(order: &[&ModuleSpec], name: &str) -> usize {
    order
        .iter()
        .position(|unit| unit.name() == name)
        .unwrap_or_else(|| panic!("{name} missing from order"))
}

fn names(order: &[&ModuleSpec]) -> Vec<String> {
    order.iter().map(|unit| unit.name().to_owned()).collect()
}

#[rstest]
fn wan_stack_is_torn_down_before_base(full_layout: StackLayout) {
    let graph = full_layout.graph().expect("valid layout");
    let teardown = graph.teardown_order();
    assert!(position(&teardown, "wanrouter") < position(&teardown, "wanpipe"));
    assert!(position(&teardown, "wanpipe") < position(&teardown, "dahdi"));
    assert_eq!(teardown.last().map(|unit| unit.name()), Some("dahdi"));
}

#[rstest]
fn base_is_brought_up_before_wan_stack(full_layout: StackLayout) {
    let graph = full_layout.graph().expect("valid layout");
    let bringup = graph.bringup_order();
    assert_eq!(bringup.first().map(|unit| unit.name()), Some("dahdi"));
    assert!(position(&bringup, "dahdi") < position(&bringup, "wanpipe"));
    assert!(position(&bringup, "wanpipe") < position(&bringup, "wanrouter"));
}

#[rstest]
fn every_dependent_precedes_its_unit_in_teardown(full_layout: StackLayout) {
    let graph = full_layout.graph().expect("valid layout");
    let teardown = graph.teardown_order();
    let bringup = graph.bringup_order();
    for unit in &teardown {
        for dependent in graph.dependents_of(unit.name()) {
            assert!(
                position(&teardown, dependent.name()) < position(&teardown, unit.name()),
                "{} must stop before {}",
                dependent.name(),
                unit.name()
            );
            assert!(
                position(&bringup, unit.name()) < position(&bringup, dependent.name()),
                "{} must start before {}",
                unit.name(),
                dependent.name()
            );
        }
    }
}

#[rstest]
fn ties_break_by_name(full_layout: StackLayout) {
    let graph = full_layout.graph().expect("valid layout");
    assert_eq!(
        names(&graph.teardown_order()),
        [
            "wanrouter",
            "wanpipe",
            "wct4xxp",
            "wctdm24xxp",
            "dahdi_echocan_mg2",
            "dahdi_voicebus",
            "dahdi",
        ]
    );
}

#[rstest]
fn side_effect_modules_are_not_removable(full_layout: StackLayout) {
    let graph = full_layout.graph().expect("valid layout");
    let helper = graph.get("dahdi_voicebus").expect("helper present");
    assert!(!helper.removable());
    assert!(helper.dependents().contains("wctdm24xxp"));
    assert!(graph.get("dahdi").is_some_and(ModuleSpec::removable));
}

#[test]
fn wan_service_is_a_service_unit() {
    let graph = StackLayout::new("dahdi")
        .with_wan(WanStack::new("wanrouter", "wanpipe"))
        .graph()
        .expect("valid layout");
    assert_eq!(
        graph.get("wanrouter").map(ModuleSpec::kind),
        Some(UnitKind::Service)
    );
    assert_eq!(
        graph.get("wanpipe").map(ModuleSpec::kind),
        Some(UnitKind::KernelModule)
    );
}

#[rstest]
#[case::duplicate(
    vec![ModuleSpec::kernel_module("dahdi", 1, 1), ModuleSpec::kernel_module("dahdi", 2, 2)],
    GraphError::Duplicate { unit: "dahdi".into() }
)]
#[case::self_dependent(
    vec![ModuleSpec::kernel_module("dahdi", 1, 1).with_dependents(["dahdi"])],
    GraphError::SelfDependent { unit: "dahdi".into() }
)]
#[case::unknown_dependent(
    vec![ModuleSpec::kernel_module("dahdi", 1, 1).with_dependents(["wanpipe"])],
    GraphError::UnknownDependent { unit: "dahdi".into(), dependent: "wanpipe".into() }
)]
#[case::dependent_stops_late(
    vec![
        ModuleSpec::kernel_module("dahdi", 10, 10).with_dependents(["wanpipe"]),
        ModuleSpec::kernel_module("wanpipe", 20, 20),
    ],
    GraphError::StopOrderConflict { unit: "dahdi".into(), dependent: "wanpipe".into() }
)]
#[case::dependent_starts_early(
    vec![
        ModuleSpec::kernel_module("dahdi", 90, 10).with_dependents(["wanpipe"]),
        ModuleSpec::kernel_module("wanpipe", 20, 5),
    ],
    GraphError::StartOrderConflict { unit: "dahdi".into(), dependent: "wanpipe".into() }
)]
#[case::cycle(
    vec![
        ModuleSpec::kernel_module("a", 10, 10).with_dependents(["b"]),
        ModuleSpec::kernel_module("b", 5, 20).with_dependents(["a"]),
    ],
    GraphError::StopOrderConflict { unit: "b".into(), dependent: "a".into() }
)]
fn rejects_inconsistent_specifications(
    #[case] specs: Vec<ModuleSpec>,
    #[case] expected: GraphError,
) {
    assert_eq!(ModuleGraph::new(specs), Err(expected));
}

#[test]
fn colliding_layer_names_are_rejected() {
    let error = StackLayout::new("dahdi")
        .with_driver_modules(["wcb4xxp"])
        .with_echocan_modules(["wcb4xxp"])
        .graph()
        .expect_err("duplicate module");
    assert_eq!(
        error,
        GraphError::Duplicate {
            unit: "wcb4xxp".into()
        }
    );
}

#[rstest]
fn for_devices_keeps_only_needed_drivers(full_layout: StackLayout) {
    let devices = vec![HardwareDevice::new(
        "pci:0000:04:00.0",
        "d161:1220",
        "Wildcard TE220",
        vec!["wct4xxp".into()],
    )];
    let restricted = full_layout.for_devices(&devices);
    assert_eq!(restricted.driver_modules(), ["wct4xxp"]);
    assert!(restricted.wan().is_none());
}

#[rstest]
fn for_devices_keeps_wan_stack_for_wan_hardware(full_layout: StackLayout) {
    let devices = vec![HardwareDevice::new(
        "pci:0000:05:00.0",
        "1923:0100",
        "Sangoma A101",
        vec!["wanpipe".into()],
    )];
    let restricted = full_layout.for_devices(&devices);
    assert!(restricted.driver_modules().is_empty());
    assert_eq!(restricted.wan().map(WanStack::module), Some("wanpipe"));
    let graph = restricted.graph().expect("valid layout");
    assert!(graph.contains("wanrouter"));
}

#[test]
fn names_are_normalised() {
    let layout = StackLayout::new("dahdi").with_driver_modules(["dahdi-dummy"]);
    assert_eq!(layout.driver_modules(), ["dahdi_dummy"]);
}
