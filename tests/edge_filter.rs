mod common;

use common::function;
use gocallgraph::core::{is_std_pkg_path, EdgeFilter};
use gocallgraph::ir::{FunctionKind, Synthetic};

fn filter(ignore: &[&str]) -> EdgeFilter {
    EdgeFilter::new(
        "example.com/m",
        ignore.iter().map(|s| s.to_string()).collect(),
    )
}

#[test]
fn std_paths_are_recognised() {
    for path in ["fmt", "net/http", "encoding/json", "crypto/sha256", "unsafe"] {
        assert!(is_std_pkg_path(path), "{path} should be std");
    }
    for path in [
        "example.com/m",
        "github.com/acme/lib",
        "command-line-arguments",
        "",
        "mymodule/pkg",
    ] {
        assert!(!is_std_pkg_path(path), "{path} should not be std");
    }
}

#[test]
fn internal_calls_are_kept() {
    let caller = function(0, "example.com/m.main", Some("example.com/m"), FunctionKind::Function);
    let callee = function(
        1,
        "example.com/m/svc.Run",
        Some("example.com/m/svc"),
        FunctionKind::Function,
    );
    assert!(filter(&[]).accepts(&caller, &callee));
}

#[test]
fn calls_into_std_or_third_party_code() {
    let caller = function(0, "example.com/m.main", Some("example.com/m"), FunctionKind::Function);
    let println = function(1, "fmt.Println", Some("fmt"), FunctionKind::External);
    assert!(!filter(&[]).accepts(&caller, &println));

    // Third-party callees still touch the module through the caller.
    let vendor = function(
        2,
        "github.com/acme/lib.Do",
        Some("github.com/acme/lib"),
        FunctionKind::External,
    );
    assert!(filter(&[]).accepts(&caller, &vendor));

    let outside = function(
        3,
        "github.com/acme/lib.Other",
        Some("github.com/acme/lib"),
        FunctionKind::External,
    );
    assert!(!filter(&[]).accepts(&vendor, &outside));
}

#[test]
fn synthetic_and_packageless_endpoints_are_dropped() {
    let caller = function(0, "example.com/m.main", Some("example.com/m"), FunctionKind::Function);
    let init = function(
        1,
        "example.com/m.init",
        Some("example.com/m"),
        FunctionKind::Synthetic(Synthetic::PackageInitializer),
    );
    assert!(!filter(&[]).accepts(&caller, &init));
    // A synthetic caller with a package is fine.
    let user_init = function(
        2,
        "example.com/m.init#1",
        Some("example.com/m"),
        FunctionKind::Function,
    );
    assert!(filter(&[]).accepts(&init, &user_init));

    let bound = function(
        3,
        "(example.com/m.T).M$bound",
        None,
        FunctionKind::Synthetic(Synthetic::BoundMethod),
    );
    assert!(!filter(&[]).accepts(&bound, &user_init));
}

#[test]
fn ignore_prefixes_match_either_endpoint() {
    let caller = function(0, "example.com/m.main", Some("example.com/m"), FunctionKind::Function);
    let callee = function(
        1,
        "example.com/m/gen.Build",
        Some("example.com/m/gen"),
        FunctionKind::Function,
    );
    assert!(!filter(&["example.com/m/gen"]).accepts(&caller, &callee));
    assert!(!filter(&["example.com/m.main"]).accepts(&caller, &callee));
    assert!(filter(&["example.com/m/other"]).accepts(&caller, &callee));

    assert!(filter(&["a"]).is_ignored("abc", "xyz"));
    assert!(!filter(&["b"]).is_ignored("abc", "xyz"));
}

#[test]
fn module_path_containment_is_substring_based() {
    let f = filter(&[]);
    assert!(f.is_internal("(*example.com/m/svc.Server).Start", "github.com/x.Y"));
    assert!(!f.is_internal("github.com/x.Y", "github.com/x.Z"));
    assert_eq!(f.module(), "example.com/m");
}
