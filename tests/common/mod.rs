//! Shared fixture builders for the end-to-end tests. Writes a minimal
//! on-disk collection (DAG file + playbooks) and loads it through the real
//! `Collection`/`Collections` parsing path, the same way the CLI does.

use std::path::Path;

use tdp_lib::aggregator::Collections;
use tdp_lib::collection::Collection;

/// One collection directory: a DAG file plus `(operation_name, playbook_yaml)`
/// pairs for whichever operations actually have a playbook backing them.
pub struct CollectionSpec<'a> {
    pub name: &'a str,
    pub dag_yaml: &'a str,
    pub playbooks: &'a [(&'a str, &'a str)],
}

pub fn build_collections(root: &Path, specs: &[CollectionSpec]) -> Collections {
    let mut collections = Vec::new();
    for spec in specs {
        let collection_root = root.join(spec.name);
        std::fs::create_dir_all(collection_root.join("tdp_lib_dag")).unwrap();
        std::fs::create_dir_all(collection_root.join("tdp_vars_defaults")).unwrap();
        std::fs::create_dir_all(collection_root.join("playbooks")).unwrap();
        std::fs::write(collection_root.join("tdp_lib_dag").join("dag.yml"), spec.dag_yaml).unwrap();
        for (name, content) in spec.playbooks {
            std::fs::write(
                collection_root.join("playbooks").join(format!("{name}.yml")),
                content,
            )
            .unwrap();
        }
        collections.push(Collection::from_path(&collection_root).unwrap());
    }
    Collections::from_collections(&collections).unwrap()
}

/// The S1 fixture (spec §8): `serv_comp_{install,config,start,init}` backed
/// by single-host playbooks, plus noop service-level aggregators
/// `serv_{install,config,start,init}` with no playbook of their own.
pub fn minimal_dag_spec() -> CollectionSpec<'static> {
    CollectionSpec {
        name: "core",
        dag_yaml: "- name: serv_comp_install\n  depends_on: []\n\
            - name: serv_comp_config\n  depends_on: [serv_comp_install]\n\
            - name: serv_comp_start\n  depends_on: [serv_comp_config]\n\
            - name: serv_comp_init\n  depends_on: [serv_comp_start]\n\
            - name: serv_install\n  depends_on: [serv_comp_install]\n\
            - name: serv_config\n  depends_on: [serv_comp_config, serv_install]\n\
            - name: serv_start\n  depends_on: [serv_comp_start, serv_config]\n\
            - name: serv_init\n  depends_on: [serv_comp_init, serv_start]\n",
        playbooks: &[
            ("serv_comp_install", "- hosts: h1\n"),
            ("serv_comp_config", "- hosts: h1\n"),
            ("serv_comp_start", "- hosts: h1\n"),
            ("serv_comp_init", "- hosts: h1\n"),
        ],
    }
}
