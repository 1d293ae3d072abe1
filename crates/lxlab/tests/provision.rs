//! End-to-end provisioning against a recording executor.

use std::path::Path;
use std::sync::Arc;

use lxlab::libvirt::DomainXmlGenerator;
use lxlab::{ContainerSpec, Orchestrator, ProvisionConfig, SpecFile};
use lxlab_common::LabError;
use lxlab_common::testing::RecordingExecutor;

const DEFINITIONS: &str = include_str!("../../../demos/containers.yaml");

fn spec(name: &str) -> ContainerSpec {
    SpecFile::parse(DEFINITIONS)
        .unwrap()
        .container_spec(name)
        .unwrap()
}

fn orchestrator(exec: &Arc<RecordingExecutor>, root: &Path) -> Orchestrator {
    Orchestrator::new(ProvisionConfig::default().with_root(root), exec.clone())
        .with_xml_generator(DomainXmlGenerator::new().skip_emulator_check())
}

#[test_log::test(tokio::test)]
async fn access_mode_container() {
    let temp = tempfile::tempdir().unwrap();
    let exec = Arc::new(RecordingExecutor::new());

    let summary = orchestrator(&exec, temp.path())
        .create_container(&spec("H1"))
        .await
        .unwrap();

    // Bridge filtering disabled, no VLANs added.
    assert_eq!(
        exec.count_matching("ip link set BR_L1_H1 type bridge vlan_filtering 0"),
        1
    );
    assert_eq!(exec.count_matching("bridge vlan add"), 0);

    // Rootfs tree created with privileges.
    let rootfs = temp.path().join("H1/rootfs");
    assert_eq!(summary.rootfs, rootfs);
    assert_eq!(
        exec.count_matching(&format!("mkdir -p {}", temp.path().join("H1").display())),
        1
    );

    // Test address assigned directly.
    let init = exec
        .written_file(&rootfs.join("usr/local/bin/container-init"))
        .unwrap();
    assert!(init.contains("ip addr add 11.1.2.141/24 dev eth1\n"));
    assert!(!init.contains("type vlan"));

    // Exactly one domain defined, after removing any previous one.
    assert_eq!(exec.count_matching("virsh -c lxc:/// define"), 1);
    let undefine = exec.position("virsh -c lxc:/// undefine H1").unwrap();
    let define = exec.position("virsh -c lxc:/// define").unwrap();
    assert!(undefine < define);
}

#[tokio::test]
async fn trunk_mode_container() {
    let temp = tempfile::tempdir().unwrap();
    let exec = Arc::new(RecordingExecutor::new());

    orchestrator(&exec, temp.path())
        .create_container(&spec("H2"))
        .await
        .unwrap();

    let lines = exec.command_lines();
    let enable = lines
        .iter()
        .position(|l| l == "ip link set BR_L2_H2 type bridge vlan_filtering 1")
        .unwrap();
    let vid10 = lines
        .iter()
        .position(|l| l == "bridge vlan add vid 10 dev BR_L2_H2 self")
        .unwrap();
    let vid20 = lines
        .iter()
        .position(|l| l == "bridge vlan add vid 20 dev BR_L2_H2 self")
        .unwrap();
    assert!(enable < vid10 && vid10 < vid20);

    let rootfs = temp.path().join("H2/rootfs");
    let zebra = exec.written_file(&rootfs.join("etc/frr/zebra.conf")).unwrap();
    assert!(zebra.contains("interface eth1.10\n"));
    assert!(zebra.contains("interface eth1.20\n"));

    let init = exec
        .written_file(&rootfs.join("usr/local/bin/container-init"))
        .unwrap();
    assert!(init.contains("ip link add link eth1 name eth1.10 type vlan id 10\n"));
    assert!(init.contains("ip link add link eth1 name eth1.20 type vlan id 20\n"));
    assert!(!init.contains(" dev eth1\n"));
}

#[tokio::test]
async fn bridge_failure_stops_before_rootfs() {
    let temp = tempfile::tempdir().unwrap();
    let exec = Arc::new(RecordingExecutor::new().fail_always("vid 20"));

    let err = orchestrator(&exec, temp.path())
        .create_container(&spec("H2"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Provisioning of H2 failed at stage configure-bridge"
    );
    let LabError::Stage { source, .. } = err else {
        panic!("expected a stage error");
    };
    assert_eq!(source.to_string(), "Failed to add VLAN 20 to bridge BR_L2_H2");
    assert_eq!(exec.count_matching("debootstrap"), 0);
    assert!(!temp.path().join("H2").exists());
}

#[tokio::test]
async fn transient_bootstrap_failures_are_retried() {
    let temp = tempfile::tempdir().unwrap();
    let exec = Arc::new(RecordingExecutor::new().fail_times("debootstrap", 2));

    let summary = orchestrator(&exec, temp.path())
        .create_container(&spec("H1"))
        .await
        .unwrap();

    assert_eq!(summary.bootstrap.attempts, 3);
    assert_eq!(summary.bootstrap.cleanups, 2);
    assert_eq!(exec.count_matching("virsh -c lxc:/// define"), 1);
}

#[tokio::test]
async fn registration_failure_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let exec = Arc::new(RecordingExecutor::new().fail_always(" define "));

    let err = orchestrator(&exec, temp.path())
        .create_container(&spec("H1"))
        .await
        .unwrap_err();

    let LabError::Stage { stage, source, .. } = err else {
        panic!("expected a stage error");
    };
    assert_eq!(stage, "define-domain");
    assert!(matches!(*source, LabError::Registration { .. }));
}

#[tokio::test]
async fn reprovisioning_is_repeatable() {
    let temp = tempfile::tempdir().unwrap();
    let exec = Arc::new(RecordingExecutor::new());
    let orchestrator = orchestrator(&exec, temp.path());

    orchestrator.create_container(&spec("H1")).await.unwrap();
    orchestrator.create_container(&spec("H1")).await.unwrap();

    assert_eq!(exec.count_matching("virsh -c lxc:/// undefine H1"), 2);
    assert_eq!(exec.count_matching("virsh -c lxc:/// define"), 2);
}
