// ABOUTME: Property tests for container file name canonicalisation.
// ABOUTME: Names are stable under re-application and never contain path separators.

use proptest::prelude::*;
use stowage::canonical::{ExtensionPolicy, canonicalise, registry_aliases};
use stowage::types::RegistrySet;

const REGISTRIES: [&str; 5] = [
    "docker.io",
    "quay.io",
    "depot.galaxyproject.org/singularity",
    "community.wave.seqera.io/library",
    "community-cr-prod.seqera.io/docker/registry/v2",
];

fn registries() -> RegistrySet {
    REGISTRIES.into_iter().collect()
}

fn reference() -> impl Strategy<Value = String> {
    let scheme = prop_oneof![
        Just(""),
        Just("docker://"),
        Just("oras://"),
        Just("https://"),
    ];
    let registry = prop_oneof![
        Just(String::new()),
        proptest::sample::select(REGISTRIES.to_vec()).prop_map(|r| format!("{r}/")),
        Just("ghcr.io/".to_string()),
    ];
    let path = proptest::collection::vec("[a-z][a-z0-9_]{0,7}", 1..3).prop_map(|p| p.join("/"));
    let tag = proptest::option::of("[0-9][0-9.]{0,5}(--[a-z0-9_]{1,8})?");
    (scheme, registry, path, tag).prop_map(|(scheme, registry, path, tag)| match tag {
        Some(tag) => format!("{scheme}{registry}{path}:{tag}"),
        None => format!("{scheme}{registry}{path}"),
    })
}

fn policy() -> impl Strategy<Value = ExtensionPolicy> {
    prop_oneof![
        Just(ExtensionPolicy::Singularity),
        Just(ExtensionPolicy::Docker)
    ]
}

proptest! {
    #[test]
    fn canonicalising_is_idempotent(reference in reference(), policy in policy()) {
        let registries = registries();
        let once = canonicalise(&reference, &registries, policy);
        let twice = canonicalise(once.as_str(), &registries, policy);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn names_are_flat(reference in reference(), policy in policy()) {
        let name = canonicalise(&reference, &registries(), policy);
        prop_assert!(!name.as_str().contains('/'));
        prop_assert!(!name.as_str().contains(':'));
        let extension = match policy {
            ExtensionPolicy::Singularity => ".img",
            ExtensionPolicy::Docker => ".tar",
        };
        prop_assert!(name.as_str().ends_with(extension));
    }

    #[test]
    fn registry_prefix_does_not_change_the_name(
        registry in proptest::sample::select(REGISTRIES.to_vec()),
        path in "[a-z][a-z0-9]{0,7}/[a-z][a-z0-9]{0,7}:[0-9]{1,3}",
    ) {
        let registries = registries();
        let bare = canonicalise(&path, &registries, ExtensionPolicy::Singularity);
        let prefixed = canonicalise(&format!("{registry}/{path}"), &registries, ExtensionPolicy::Singularity);
        prop_assert_eq!(bare, prefixed);
    }

    #[test]
    fn aliases_canonicalise_back_to_the_name(reference in reference()) {
        let registries = registries();
        let name = canonicalise(&reference, &registries, ExtensionPolicy::Singularity);
        for alias in registry_aliases(&name, &registries) {
            prop_assert_eq!(
                canonicalise(&alias, &registries, ExtensionPolicy::Singularity),
                name.clone()
            );
        }
    }
}
