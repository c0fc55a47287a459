//! Normalizer tests against raw exports written to a temporary directory
//!
//! The fixtures mimic the long-format CSV exports of the monitoring
//! sources: `_time`, `_field`, `_value` plus the entity key columns.

#[cfg(test)]
mod fixture_tests {
    use crate::error::DatasetError;
    use crate::frame::{column_names, has_column, numbers};
    use crate::models::SourceKind;
    use crate::normalizer::{
        normalize, normalize_source, processed_path, read_processed, sink, sinks, SourceSpec,
    };
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const K8S_HEADER: &str = "_time,_field,_value,container_name,namespace,pod_name";
    const SCAPH_VM_HEADER: &str =
        "_time,_field,_value,inventory-cluster-id,inventory-rack-id,vm_id,vm_name";
    const VM_POWER: &str = "scaph_process_power_consumption_microwatts";
    const VM_CPU: &str = "scaph_process_cpu_usage_percentage";

    fn write_export(dir: &Path, name: &str, header: &str, rows: &[impl AsRef<str>]) {
        let mut body = String::from(header);
        body.push('\n');
        for row in rows {
            body.push_str(row.as_ref());
            body.push('\n');
        }
        fs::write(dir.join(name), body).unwrap();
    }

    /// A scaphandre VM export row for VM 101 in cluster c1, rack r1
    fn vm_row(time: &str, field: &str, value: &str) -> String {
        format!("{time},{field},{value},c1,r1,101,k8s-1")
    }

    fn k8s_spec() -> SourceSpec {
        sinks(SourceKind::K8s).remove(0)
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "k8s_a.csv",
            K8S_HEADER,
            &[
                "2025-08-01T00:00:30Z,cpu_usage_nanocores,2000000,app,default,app-1",
                "2025-08-01T00:00:30Z,memory_usage_bytes,1048576,app,default,app-1",
                "2025-08-01T00:00:00Z,cpu_usage_nanocores,1000000,db,default,db-1",
            ],
        );

        let first = normalize(dir.path(), &k8s_spec()).unwrap();
        let second = normalize(dir.path(), &k8s_spec()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.height(), 2);
        assert_eq!(
            column_names(&first),
            [
                "_time",
                "container_name",
                "namespace",
                "pod_name",
                "cpu_usage_nanocores",
                "memory_usage_bytes"
            ]
        );
    }

    #[test]
    fn test_duplicates_collapse_to_mean() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "k8s_dup.csv",
            K8S_HEADER,
            &[
                "2025-08-01T00:00:00Z,cpu_usage_nanocores,1,app,default,app-1",
                "2025-08-01T00:00:00Z,cpu_usage_nanocores,2,app,default,app-1",
                "2025-08-01T00:00:00Z,cpu_usage_nanocores,6,app,default,app-1",
            ],
        );
        let df = normalize(dir.path(), &k8s_spec()).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(numbers(&df, "cpu_usage_nanocores").unwrap(), [Some(3.0)]);
    }

    #[test]
    fn test_files_concatenate_sorted_by_time() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "k8s_1.csv",
            K8S_HEADER,
            &["2025-08-01T00:02:00Z,cpu_usage_nanocores,3,app,default,app-1"],
        );
        write_export(
            dir.path(),
            "k8s_2.csv",
            K8S_HEADER,
            &[
                "2025-08-01T00:00:00Z,memory_usage_bytes,10,app,default,app-1",
                "2025-08-01T00:02:00Z,memory_usage_bytes,20,app,default,app-1",
            ],
        );
        // ignored: wrong prefix and wrong suffix
        write_export(dir.path(), "kepler_1.csv", K8S_HEADER, &[] as &[&str]);
        write_export(dir.path(), "k8s_notes.txt", "junk", &[] as &[&str]);

        let df = normalize(dir.path(), &k8s_spec()).unwrap();
        assert_eq!(df.height(), 3);
        // stable sort: the 00:02 row of k8s_1 stays before the one of k8s_2
        assert_eq!(
            numbers(&df, "cpu_usage_nanocores").unwrap(),
            [None, Some(3.0), None]
        );
        assert_eq!(
            numbers(&df, "memory_usage_bytes").unwrap(),
            [Some(10.0), None, Some(20.0)]
        );
    }

    #[test]
    fn test_empty_directory_yields_empty_table() {
        let dir = TempDir::new().unwrap();
        let df = normalize(dir.path(), &k8s_spec()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(
            column_names(&df),
            ["_time", "container_name", "namespace", "pod_name"]
        );
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            normalize(&missing, &k8s_spec()),
            Err(DatasetError::Io { .. })
        ));
    }

    #[test]
    fn test_missing_key_column_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "k8s_bad.csv",
            "_time,_field,_value,container_name,namespace",
            &["2025-08-01T00:00:00Z,cpu_usage_nanocores,1,app,default"],
        );
        let err = normalize(dir.path(), &k8s_spec()).unwrap_err();
        match err {
            DatasetError::MissingColumn { column, .. } => assert_eq!(column, "pod_name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_value_without_coercion_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "k8s_text.csv",
            K8S_HEADER,
            &["2025-08-01T00:00:00Z,cpu_usage_nanocores,n/a,app,default,app-1"],
        );
        assert!(matches!(
            normalize(dir.path(), &k8s_spec()),
            Err(DatasetError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_proxmox_coerces_values_and_adds_disk_columns() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "proxmox_vm.csv",
            "_time,_field,_value,inventory-server-id,vm_id,vm_name",
            &[
                "2025-08-01T00:00:00Z,disk_free,536870912,srv-1,101,k8s-worker-1",
                "2025-08-01T00:00:00Z,disk_total,1073741824,srv-1,101,k8s-worker-1",
                "2025-08-01T00:00:00Z,cpuload,garbage,srv-1,101,k8s-worker-1",
                "2025-08-01T00:00:00Z,cpuload,0.25,srv-1,101,k8s-worker-1",
            ],
        );
        let spec = sinks(SourceKind::Proxmox).remove(0);
        let df = normalize(dir.path(), &spec).unwrap();

        assert_eq!(df.height(), 1);
        assert_eq!(numbers(&df, "cpuload").unwrap(), [Some(0.25)]);
        assert_eq!(numbers(&df, "disk_free_gb").unwrap(), [Some(0.5)]);
        assert_eq!(numbers(&df, "disk_total_gb").unwrap(), [Some(1.0)]);
        assert_eq!(numbers(&df, "disk_used_gb").unwrap(), [Some(0.5)]);
        let percent = numbers(&df, "disk_usage_percent").unwrap()[0].unwrap();
        assert!((percent - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_scaphandre_sinks_split_and_persist() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "scaphandre_flux_host.csv",
            "_time,_field,_value,inventory-cluster-id,inventory-rack-id,url",
            &[
                "2025-08-01T00:00:00Z,scaph_host_power_microwatts,5000000,c1,r1,http://h1",
                "2025-08-01T00:01:00Z,scaph_host_power_microwatts,6000000,c1,r1,http://h1",
            ],
        );
        write_export(
            dir.path(),
            "scaphandre_neuronet_vm.csv",
            SCAPH_VM_HEADER,
            &[
                vm_row("2025-08-01T00:00:00Z", VM_POWER, "1000000"),
                vm_row("2025-08-01T00:00:00Z", VM_CPU, "12.5"),
                // incomplete row: no power reading for this timestamp
                vm_row("2025-08-01T00:01:00Z", VM_CPU, "13.0"),
            ],
        );

        let outputs = normalize_source(SourceKind::Scaphandre, dir.path(), None).unwrap();
        assert_eq!(outputs.len(), 2);

        let host = &outputs[0];
        assert_eq!(host.path, processed_path(dir.path(), "host_scaphandre_processed.csv"));
        assert_eq!(host.frame.height(), 2);
        assert!(has_column(&host.frame, "url"));

        let vm = &outputs[1];
        assert_eq!(vm.path, processed_path(dir.path(), "vm_scaphandre_processed.csv"));
        assert_eq!(vm.frame.height(), 1);
        assert!(has_column(&vm.frame, "vm_id"));
        assert!(!has_column(&vm.frame, "url"));

        let reread = read_processed(&vm.path, &vm.spec).unwrap();
        assert_eq!(reread, vm.frame);
    }

    #[test]
    fn test_normalize_source_custom_output_name() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "pdu_rack.csv",
            "_time,_field,_value,inventory-server-id,placement,url",
            &["2025-08-01T00:00:00Z,power_watts,230.5,srv-1,A,http://pdu1"],
        );
        let outputs = normalize_source(SourceKind::Pdu, dir.path(), Some("pdu_out.csv")).unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(dir.path().join("processed").join("pdu_out.csv").is_file());

        let spec = sink(SourceKind::Pdu, "pdu").unwrap();
        let reread = read_processed(&outputs[0].path, &spec).unwrap();
        assert_eq!(numbers(&reread, "power_watts").unwrap(), [Some(230.5)]);
    }

    #[test]
    fn test_rows_without_keys_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_export(
            dir.path(),
            "k8s_holes.csv",
            K8S_HEADER,
            &[
                "2025-08-01T00:00:00Z,cpu_usage_nanocores,1,,default,app-1",
                ",cpu_usage_nanocores,1,app,default,app-1",
                "2025-08-01T00:00:00Z,cpu_usage_nanocores,4,app,default,app-1",
            ],
        );
        let df = normalize(dir.path(), &k8s_spec()).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(numbers(&df, "cpu_usage_nanocores").unwrap(), [Some(4.0)]);
    }

    #[test]
    fn test_scaphandre_identical_exports_collapse_to_one_row() {
        let dir = TempDir::new().unwrap();
        let rows = [
            vm_row("2025-08-01T00:00:00Z", VM_POWER, "1000000"),
            vm_row("2025-08-01T00:00:00Z", VM_CPU, "12.5"),
        ];
        for name in ["scaphandre_neuronet_a.csv", "scaphandre_neuronet_b.csv"] {
            write_export(dir.path(), name, SCAPH_VM_HEADER, &rows);
        }

        let spec = sink(SourceKind::Scaphandre, "scaphandre_vm").unwrap();
        let df = normalize(dir.path(), &spec).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(
            numbers(&df, VM_POWER).unwrap(),
            [Some(1_000_000.0)]
        );

        // without the cleanup both copies survive
        let mut keep_all = spec.clone();
        keep_all.drop_incomplete = false;
        assert_eq!(normalize(dir.path(), &keep_all).unwrap().height(), 2);
    }
}
