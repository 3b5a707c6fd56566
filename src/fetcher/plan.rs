// ABOUTME: Decides, per container, whether to skip, copy, or fetch remotely.
// ABOUTME: Pure function of the file system state so every branch is testable.

use crate::canonical::{ExtensionPolicy, canonicalise};
use crate::config::LocationPolicy;
use crate::types::{ArtefactName, ContainerRef, RegistrySet};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already present in the remote cache named by the index file.
    RemoteCached,
    /// Already present in the output directory.
    Exists,
    /// Another reference canonicalised to the same file name.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanItem {
    Skip(SkipReason),
    Copy { src: PathBuf, dest: PathBuf },
    RemoteFetch { target: PathBuf },
}

/// Where images may come from and go to.
#[derive(Debug, Clone)]
pub struct Locations {
    pub output_dir: PathBuf,
    pub library_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub policy: LocationPolicy,
}

impl Locations {
    /// Cache directory, if the policy writes into it.
    fn writable_cache(&self) -> Option<&Path> {
        match self.policy {
            LocationPolicy::Amend | LocationPolicy::Copy => self.cache_dir.as_deref(),
            LocationPolicy::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedContainer {
    pub reference: ContainerRef,
    pub name: ArtefactName,
    pub items: Vec<PlanItem>,
}

/// A remote pull or download into `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub reference: ContainerRef,
    pub name: ArtefactName,
    pub target: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub reference: ContainerRef,
    pub name: ArtefactName,
    pub src: PathBuf,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    pub containers: Vec<PlannedContainer>,
}

impl FetchPlan {
    /// Units of work for the summary row: one per container plus one for
    /// every second copy queued for the same container.
    pub fn task_total(&self) -> u64 {
        self.containers
            .iter()
            .map(|container| {
                let copies = container
                    .items
                    .iter()
                    .filter(|item| matches!(item, PlanItem::Copy { .. }))
                    .count();
                let remote = container
                    .items
                    .iter()
                    .any(|item| matches!(item, PlanItem::RemoteFetch { .. }));
                let work = copies + usize::from(remote);
                work.max(1) as u64
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.containers
            .iter()
            .filter(|container| {
                container
                    .items
                    .iter()
                    .all(|item| matches!(item, PlanItem::Skip(_)))
            })
            .count()
    }

    pub fn remote_jobs(&self) -> Vec<RemoteJob> {
        self.containers
            .iter()
            .flat_map(|container| {
                container.items.iter().filter_map(|item| match item {
                    PlanItem::RemoteFetch { target } => Some(RemoteJob {
                        reference: container.reference.clone(),
                        name: container.name.clone(),
                        target: target.clone(),
                    }),
                    _ => None,
                })
            })
            .collect()
    }

    pub fn copy_jobs(&self) -> Vec<CopyJob> {
        self.containers
            .iter()
            .flat_map(|container| {
                container.items.iter().filter_map(|item| match item {
                    PlanItem::Copy { src, dest } => Some(CopyJob {
                        reference: container.reference.clone(),
                        name: container.name.clone(),
                        src: src.clone(),
                        dest: dest.clone(),
                    }),
                    _ => None,
                })
            })
            .collect()
    }
}

/// Builds the fetch plan for `refs`.
///
/// Decision order per container: remote index hit, existing output file,
/// library copy, cache copy, then a remote fetch into the cache or output.
pub fn plan_fetches(
    refs: &[ContainerRef],
    registries: &RegistrySet,
    extensions: ExtensionPolicy,
    remote_exclude: &BTreeSet<String>,
    locations: &Locations,
) -> FetchPlan {
    let mut seen: HashSet<ArtefactName> = HashSet::new();
    let mut plan = FetchPlan::default();

    for reference in refs {
        let name = canonicalise(reference.as_str(), registries, extensions);
        let items = if !seen.insert(name.clone()) {
            vec![PlanItem::Skip(SkipReason::Duplicate)]
        } else {
            plan_one(&name, remote_exclude, locations)
        };
        tracing::debug!(container = %reference, name = %name, ?items, "planned");
        plan.containers.push(PlannedContainer {
            reference: reference.clone(),
            name,
            items,
        });
    }
    plan
}

fn plan_one(
    name: &ArtefactName,
    remote_exclude: &BTreeSet<String>,
    locations: &Locations,
) -> Vec<PlanItem> {
    if remote_exclude.contains(name.as_str()) {
        return vec![PlanItem::Skip(SkipReason::RemoteCached)];
    }

    let output_path = locations.output_dir.join(name);
    if output_path.exists() {
        return vec![PlanItem::Skip(SkipReason::Exists)];
    }

    let cache_path = locations.cache_dir.as_ref().map(|dir| dir.join(name));

    if let Some(library_path) = locations
        .library_dir
        .as_ref()
        .map(|dir| dir.join(name))
        .filter(|path| path.exists())
    {
        let mut items = vec![PlanItem::Copy {
            src: library_path.clone(),
            dest: output_path,
        }];
        if locations.policy == LocationPolicy::Copy
            && let Some(cache_path) = cache_path.filter(|path| !path.exists())
        {
            items.push(PlanItem::Copy {
                src: library_path,
                dest: cache_path,
            });
        }
        return items;
    }

    if let Some(cache_path) = cache_path.filter(|path| path.exists()) {
        return vec![PlanItem::Copy {
            src: cache_path,
            dest: output_path,
        }];
    }

    match (locations.policy, locations.writable_cache()) {
        (LocationPolicy::Amend, Some(cache_dir)) => vec![PlanItem::RemoteFetch {
            target: cache_dir.join(name),
        }],
        (LocationPolicy::Copy, Some(cache_dir)) => {
            let cache_path = cache_dir.join(name);
            vec![
                PlanItem::RemoteFetch {
                    target: cache_path.clone(),
                },
                PlanItem::Copy {
                    src: cache_path,
                    dest: output_path,
                },
            ]
        }
        _ => vec![PlanItem::RemoteFetch {
            target: output_path,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        output: PathBuf,
        library: PathBuf,
        cache: PathBuf,
    }

    fn dirs() -> Dirs {
        let root = TempDir::new().unwrap();
        let output = root.path().join("out");
        let library = root.path().join("library");
        let cache = root.path().join("cache");
        for dir in [&output, &library, &cache] {
            fs::create_dir_all(dir).unwrap();
        }
        Dirs {
            _root: root,
            output,
            library,
            cache,
        }
    }

    fn locations(dirs: &Dirs, policy: LocationPolicy) -> Locations {
        Locations {
            output_dir: dirs.output.clone(),
            library_dir: Some(dirs.library.clone()),
            cache_dir: Some(dirs.cache.clone()),
            policy,
        }
    }

    fn plan(refs: &[&str], locations: &Locations) -> FetchPlan {
        let refs: Vec<ContainerRef> = refs
            .iter()
            .map(|r| ContainerRef::parse(r).unwrap())
            .collect();
        let registries: RegistrySet = ["quay.io"].into_iter().collect();
        plan_fetches(
            &refs,
            &registries,
            ExtensionPolicy::Singularity,
            &BTreeSet::new(),
            locations,
        )
    }

    const FASTQC: &str = "quay.io/biocontainers/fastqc:0.11.9--0";
    const FASTQC_FILE: &str = "biocontainers-fastqc-0.11.9--0.img";

    #[test]
    fn existing_output_is_skipped() {
        let dirs = dirs();
        fs::write(dirs.output.join(FASTQC_FILE), b"x").unwrap();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::Copy));
        assert_eq!(
            plan.containers[0].items,
            vec![PlanItem::Skip(SkipReason::Exists)]
        );
        assert_eq!(plan.skipped(), 1);
        assert_eq!(plan.task_total(), 1);
    }

    #[test]
    fn library_hit_is_mirrored_into_empty_cache_under_copy() {
        let dirs = dirs();
        fs::write(dirs.library.join(FASTQC_FILE), b"x").unwrap();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::Copy));
        assert_eq!(
            plan.containers[0].items,
            vec![
                PlanItem::Copy {
                    src: dirs.library.join(FASTQC_FILE),
                    dest: dirs.output.join(FASTQC_FILE),
                },
                PlanItem::Copy {
                    src: dirs.library.join(FASTQC_FILE),
                    dest: dirs.cache.join(FASTQC_FILE),
                },
            ]
        );
        assert_eq!(plan.task_total(), 2);
    }

    #[test]
    fn library_hit_under_amend_copies_to_output_only() {
        let dirs = dirs();
        fs::write(dirs.library.join(FASTQC_FILE), b"x").unwrap();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::Amend));
        assert_eq!(plan.copy_jobs().len(), 1);
        assert!(plan.remote_jobs().is_empty());
    }

    #[test]
    fn cache_hit_is_copied_to_output() {
        let dirs = dirs();
        fs::write(dirs.cache.join(FASTQC_FILE), b"x").unwrap();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::None));
        assert_eq!(
            plan.containers[0].items,
            vec![PlanItem::Copy {
                src: dirs.cache.join(FASTQC_FILE),
                dest: dirs.output.join(FASTQC_FILE),
            }]
        );
    }

    #[test]
    fn amend_fetches_into_cache() {
        let dirs = dirs();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::Amend));
        assert_eq!(
            plan.containers[0].items,
            vec![PlanItem::RemoteFetch {
                target: dirs.cache.join(FASTQC_FILE)
            }]
        );
    }

    #[test]
    fn copy_fetches_into_cache_then_copies_out() {
        let dirs = dirs();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::Copy));
        assert_eq!(
            plan.containers[0].items,
            vec![
                PlanItem::RemoteFetch {
                    target: dirs.cache.join(FASTQC_FILE)
                },
                PlanItem::Copy {
                    src: dirs.cache.join(FASTQC_FILE),
                    dest: dirs.output.join(FASTQC_FILE),
                },
            ]
        );
        assert_eq!(plan.task_total(), 2);
    }

    #[test]
    fn no_cache_policy_fetches_into_output() {
        let dirs = dirs();
        let plan = plan(&[FASTQC], &locations(&dirs, LocationPolicy::None));
        assert_eq!(
            plan.remote_jobs(),
            vec![RemoteJob {
                reference: ContainerRef::parse(FASTQC).unwrap(),
                name: ArtefactName::new(FASTQC_FILE).unwrap(),
                target: dirs.output.join(FASTQC_FILE),
            }]
        );
    }

    #[test]
    fn remote_index_hit_is_skipped() {
        let dirs = dirs();
        let refs = vec![ContainerRef::parse(FASTQC).unwrap()];
        let exclude: BTreeSet<String> = [FASTQC_FILE.to_string()].into_iter().collect();
        let plan = plan_fetches(
            &refs,
            &["quay.io"].into_iter().collect(),
            ExtensionPolicy::Singularity,
            &exclude,
            &locations(&dirs, LocationPolicy::None),
        );
        assert_eq!(
            plan.containers[0].items,
            vec![PlanItem::Skip(SkipReason::RemoteCached)]
        );
    }

    #[test]
    fn references_with_same_name_collapse() {
        let dirs = dirs();
        let plan = plan(
            &[FASTQC, "biocontainers/fastqc:0.11.9--0"],
            &locations(&dirs, LocationPolicy::None),
        );
        assert_eq!(plan.remote_jobs().len(), 1);
        assert_eq!(
            plan.containers[1].items,
            vec![PlanItem::Skip(SkipReason::Duplicate)]
        );
        assert_eq!(plan.task_total(), 2);
    }
}
