//! Unit tests for the sandbox policy types.

use std::path::{Path, PathBuf};

use rstest::rstest;
use tempfile::tempdir;

use super::*;

// ---------------------------------------------------------------------------
// NetworkPolicy
// ---------------------------------------------------------------------------

#[test]
fn network_policy_denies_by_default() {
    assert!(NetworkPolicy::default().is_denied());
    assert!(NetworkPolicy::deny().is_denied());
}

#[rstest]
#[case::unix_sockets(NetworkDestination::UnixSockets)]
#[case::local_tcp(NetworkDestination::LocalTcp { ports: vec![8080] })]
#[case::docker(NetworkDestination::Docker)]
#[case::hosts(NetworkDestination::Hosts {
    pattern: "*.example.org".into(),
    ports: vec![],
})]
fn granting_any_destination_enables_networking(#[case] destination: NetworkDestination) {
    let policy = NetworkPolicy::deny().allow(destination);
    assert!(!policy.is_denied());
    assert_eq!(policy.destinations().len(), 1);
}

#[test]
fn duplicate_destinations_collapse() {
    let policy = NetworkPolicy::deny()
        .allow(NetworkDestination::Docker)
        .allow(NetworkDestination::Docker);
    assert_eq!(policy.destinations().len(), 1);
}

#[rstest]
#[case::unix_sockets(NetworkDestination::UnixSockets, false)]
#[case::docker(NetworkDestination::Docker, false)]
#[case::local_tcp(NetworkDestination::LocalTcp { ports: vec![] }, true)]
#[case::hosts(
    NetworkDestination::Hosts { pattern: "registry.local".into(), ports: vec![443] },
    true
)]
fn only_tcp_destinations_need_the_host_network(
    #[case] destination: NetworkDestination,
    #[case] expected: bool,
) {
    assert_eq!(destination.needs_host_network(), expected);
    let policy = NetworkPolicy::deny().allow(destination);
    assert_eq!(policy.needs_host_network(), expected);
}

// ---------------------------------------------------------------------------
// SandboxPolicy builder
// ---------------------------------------------------------------------------

#[test]
fn new_policy_grants_nothing() {
    let policy = SandboxPolicy::new();
    assert!(policy.writable_directories().is_empty());
    assert!(policy.read_only_directories().is_empty());
    assert!(policy.tool_search_directories().is_empty());
    assert!(policy.network_policy().is_denied());
    assert_eq!(policy.environment_policy(), &EnvironmentPolicy::Isolated);
}

#[test]
fn builder_accumulates_directories() {
    let policy = SandboxPolicy::new()
        .allow_writable_directory("/tmp/out")
        .allow_writable_directory("/tmp/work")
        .allow_tool_search_directory("/opt/tools");
    assert_eq!(policy.writable_directories().len(), 2);
    assert_eq!(policy.tool_search_directories().len(), 1);
}

#[test]
fn system_libraries_include_the_loader_defaults() {
    let policy = SandboxPolicy::new().allow_system_libraries();
    assert!(
        policy
            .read_only_directories()
            .contains(&PathBuf::from("/lib"))
    );
    assert!(
        policy
            .read_only_directories()
            .contains(&PathBuf::from("/usr/lib"))
    );
}

#[test]
fn environment_allow_list_accumulates() {
    let policy = SandboxPolicy::new()
        .allow_environment_variable("PATH")
        .allow_environment_variable("HOME");
    let EnvironmentPolicy::AllowList(keys) = policy.environment_policy() else {
        panic!("expected allow list, got {:?}", policy.environment_policy());
    };
    assert!(keys.contains("PATH"));
    assert!(keys.contains("HOME"));
}

#[test]
fn inherit_all_absorbs_later_whitelisting() {
    let policy = SandboxPolicy::new()
        .allow_full_environment()
        .allow_environment_variable("PATH");
    assert_eq!(policy.environment_policy(), &EnvironmentPolicy::InheritAll);
}

// ---------------------------------------------------------------------------
// Loader configuration parsing
// ---------------------------------------------------------------------------

#[test]
fn conf_entries_skip_comments_and_blanks() {
    let dir = tempdir().expect("create tempdir");
    let conf = dir.path().join("ld.so.conf");
    std::fs::write(&conf, "# loader config\n\n/opt/libs # trailing note\n/srv/vendor\n")
        .expect("write conf");

    let entries = ld_so_conf_entries(&conf, 0);
    assert_eq!(
        entries,
        [PathBuf::from("/opt/libs"), PathBuf::from("/srv/vendor")]
    );
}

#[test]
fn conf_include_directives_expand_drop_in_files() {
    let dir = tempdir().expect("create tempdir");
    let drop_ins = dir.path().join("ld.so.conf.d");
    std::fs::create_dir(&drop_ins).expect("create drop-in dir");
    std::fs::write(drop_ins.join("10-vendor.conf"), "/opt/vendor\n").expect("write drop-in");
    std::fs::write(drop_ins.join("20-extra.conf"), "/opt/extra\n").expect("write drop-in");
    std::fs::write(drop_ins.join("notes.txt"), "/opt/ignored\n").expect("write non-conf");

    let conf = dir.path().join("ld.so.conf");
    std::fs::write(
        &conf,
        format!("include {}/*.conf\n/usr/local/lib\n", drop_ins.display()),
    )
    .expect("write conf");

    let entries = ld_so_conf_entries(&conf, 0);
    assert_eq!(
        entries,
        [
            PathBuf::from("/opt/vendor"),
            PathBuf::from("/opt/extra"),
            PathBuf::from("/usr/local/lib"),
        ]
    );
}

#[test]
fn conf_include_of_a_plain_file_is_followed() {
    let dir = tempdir().expect("create tempdir");
    let nested = dir.path().join("extra.conf");
    std::fs::write(&nested, "/opt/nested\n").expect("write nested conf");
    let conf = dir.path().join("ld.so.conf");
    std::fs::write(&conf, format!("include {}\n", nested.display())).expect("write conf");

    let entries = ld_so_conf_entries(&conf, 0);
    assert_eq!(entries, [PathBuf::from("/opt/nested")]);
}

#[test]
fn conf_include_recursion_is_bounded() {
    let dir = tempdir().expect("create tempdir");
    let conf = dir.path().join("loop.conf");
    // A file including itself must terminate at the depth limit.
    std::fs::write(&conf, format!("include {}\n/opt/looped\n", conf.display()))
        .expect("write conf");

    let entries = ld_so_conf_entries(&conf, 0);
    let looped = entries
        .iter()
        .filter(|path| *path == Path::new("/opt/looped"))
        .count();
    assert!(looped <= INCLUDE_DEPTH_LIMIT + 1);
}

#[test]
fn missing_conf_yields_no_entries() {
    assert!(ld_so_conf_entries(Path::new("/nonexistent/ld.so.conf"), 0).is_empty());
}
