//! The two dataset configurations: container energy and VM power

use super::{DatasetProfile, RowFilter, SideSpec};
use crate::features::{Derivation, DeriveMode, UnitConversion};
use crate::join::{Aggregation, AggregationPolicy};
use crate::models::{SourceKind, TIME_COLUMN};

pub const ENERGY_PROFILE: &str = "energy";
pub const VM_POWER_PROFILE: &str = "vm-power";

/// Default substring VM names must contain to enter the VM power dataset
pub const DEFAULT_VM_NAME_FILTER: &str = "k8s";

const K8S_COLUMNS: &[&str] = &[
    "cpu_usage_nanocores",
    "memory_usage_bytes",
    "logsfs_used_bytes",
    "logsfs_capacity_bytes",
];

const ENERGY_KEYS: &[&str] = &["container_name", "namespace", "pod_name"];

const ENERGY_FEATURES: &[&str] = &["cpu_millicores", "memory_usage_mb", "logsfs_usage_percent"];

const PROXMOX_COLUMNS: &[&str] = &[
    "cpuload",
    "disk_free",
    "disk_total",
    "disk_used",
    "disk_used_percentage",
    "mem_free",
    "mem_total",
    "mem_used",
    "mem_used_percentage",
    "swap_free",
    "swap_total",
    "swap_used",
    "swap_used_percentage",
    "uptime",
    "disk_free_gb",
    "disk_total_gb",
    "disk_used_gb",
    "disk_usage_percent",
];

/// Proxmox columns the profile can derive when the export lacks them
const PROXMOX_DERIVABLE: &[&str] = &["mem_used_percentage", "swap_used_percentage"];

const SCAPHANDRE_AGGREGATIONS: &[(&str, Aggregation)] = &[
    ("scaph_process_cpu_usage_percentage", Aggregation::Mean),
    ("scaph_process_disk_read_bytes", Aggregation::Sum),
    ("scaph_process_disk_total_read_bytes", Aggregation::Sum),
    ("scaph_process_disk_total_write_bytes", Aggregation::Sum),
    ("scaph_process_disk_write_bytes", Aggregation::Sum),
    ("scaph_process_memory_bytes", Aggregation::Mean),
    ("scaph_process_memory_virtual_bytes", Aggregation::Mean),
    ("scaph_process_power_consumption_microwatts", Aggregation::Sum),
];

const VM_FEATURES: &[&str] = &[
    "cpuload",
    "mem_used_percentage",
    "swap_used_percentage",
    "disk_used_percentage",
    "uptime_hours",
    "scaph_process_cpu_usage_percentage",
    "scaph_process_memory_bytes",
    "scaph_process_memory_virtual_bytes",
    "scaph_process_disk_total_read_bytes",
    "scaph_process_disk_total_write_bytes",
];

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl DatasetProfile {
    /// Container energy: k8s resource usage joined with kepler energy
    /// counters per container and bucket
    pub fn energy() -> Self {
        let projection = std::iter::once(TIME_COLUMN)
            .chain(ENERGY_KEYS.iter().copied())
            .chain(ENERGY_FEATURES.iter().copied())
            .chain(std::iter::once("container_power_watts"))
            .map(str::to_string)
            .collect();

        Self {
            name: ENERGY_PROFILE.to_string(),
            entity_keys: strings(ENERGY_KEYS),
            left: SideSpec::new(SourceKind::K8s, "k8s", strings(K8S_COLUMNS))
                .with_aggregation(AggregationPolicy::uniform(Aggregation::Mean)),
            right: SideSpec::new(
                SourceKind::Kepler,
                "kepler",
                vec!["kepler_container_joules_total".to_string()],
            )
            .with_aggregation(AggregationPolicy::uniform(Aggregation::Sum)),
            filter: None,
            derivations: vec![
                Derivation::convert(
                    "cpu_usage_nanocores",
                    "cpu_millicores",
                    UnitConversion::NanocoresToMillicores,
                ),
                Derivation::convert(
                    "memory_usage_bytes",
                    "memory_usage_mb",
                    UnitConversion::BytesToMegabytes,
                ),
                Derivation::percentage(
                    "logsfs_used_bytes",
                    "logsfs_capacity_bytes",
                    "logsfs_usage_percent",
                    DeriveMode::Always,
                ),
                Derivation::convert(
                    "kepler_container_joules_total",
                    "container_power_watts",
                    UnitConversion::JoulesPerBucketToWatts,
                ),
            ],
            projection,
            features: strings(ENERGY_FEATURES),
            target: "container_power_watts".to_string(),
        }
    }

    /// VM power: proxmox VM resources joined with scaphandre per-VM power
    /// per VM id and bucket, restricted to VMs whose name contains
    /// `vm_name_filter` (no restriction when `None`)
    pub fn vm_power(vm_name_filter: Option<&str>) -> Self {
        let required: Vec<String> = PROXMOX_COLUMNS
            .iter()
            .filter(|c| !PROXMOX_DERIVABLE.contains(*c))
            .map(|c| c.to_string())
            .collect();
        let scaph_columns: Vec<String> = SCAPHANDRE_AGGREGATIONS
            .iter()
            .map(|(c, _)| c.to_string())
            .collect();
        let scaph_policy = SCAPHANDRE_AGGREGATIONS
            .iter()
            .fold(AggregationPolicy::uniform(Aggregation::Mean), |policy, (c, agg)| {
                policy.with(*c, *agg)
            });

        let projection = [TIME_COLUMN, "vm_id"]
            .iter()
            .chain(PROXMOX_COLUMNS)
            .map(|c| c.to_string())
            .chain(scaph_columns.iter().cloned())
            .chain(["uptime_hours".to_string(), "vm_power_watts".to_string()])
            .collect();

        Self {
            name: VM_POWER_PROFILE.to_string(),
            entity_keys: vec!["vm_id".to_string()],
            left: SideSpec::new(SourceKind::Proxmox, "proxmox", required)
                .with_optional_columns(strings(PROXMOX_DERIVABLE))
                .with_aggregation(AggregationPolicy::uniform(Aggregation::Mean)),
            right: SideSpec::new(SourceKind::Scaphandre, "scaphandre_vm", scaph_columns)
                .with_aggregation(scaph_policy),
            filter: vm_name_filter.map(|needle| RowFilter::contains("vm_name", needle)),
            derivations: vec![
                Derivation::convert("uptime", "uptime_hours", UnitConversion::SecondsToHours),
                Derivation::convert(
                    "scaph_process_power_consumption_microwatts",
                    "vm_power_watts",
                    UnitConversion::MicrowattsToWatts,
                ),
                Derivation::percentage(
                    "mem_used",
                    "mem_total",
                    "mem_used_percentage",
                    DeriveMode::IfAbsent,
                ),
                Derivation::percentage(
                    "swap_used",
                    "swap_total",
                    "swap_used_percentage",
                    DeriveMode::IfAbsent,
                ),
            ],
            projection,
            features: strings(VM_FEATURES),
            target: "vm_power_watts".to_string(),
        }
    }

    /// Look a profile up by name
    pub fn by_name(name: &str, vm_name_filter: Option<&str>) -> Option<Self> {
        match name {
            ENERGY_PROFILE => Some(Self::energy()),
            VM_POWER_PROFILE | "vm_power" => Some(Self::vm_power(vm_name_filter)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_are_valid() {
        DatasetProfile::energy().validate().unwrap();
        DatasetProfile::vm_power(Some(DEFAULT_VM_NAME_FILTER))
            .validate()
            .unwrap();
        DatasetProfile::vm_power(None).validate().unwrap();
    }

    #[test]
    fn test_energy_projection_order() {
        let profile = DatasetProfile::energy();
        assert_eq!(
            profile.projection,
            vec![
                "_time",
                "container_name",
                "namespace",
                "pod_name",
                "cpu_millicores",
                "memory_usage_mb",
                "logsfs_usage_percent",
                "container_power_watts"
            ]
        );
        assert_eq!(profile.join_keys(), vec!["_time", "container_name", "namespace", "pod_name"]);
    }

    #[test]
    fn test_vm_power_aggregations() {
        let profile = DatasetProfile::vm_power(None);
        let policy = &profile.right.aggregation;
        assert_eq!(
            policy.for_column("scaph_process_power_consumption_microwatts"),
            Aggregation::Sum
        );
        assert_eq!(
            policy.for_column("scaph_process_cpu_usage_percentage"),
            Aggregation::Mean
        );
        assert!(profile.filter.is_none());
        assert!(profile.left.optional_columns.contains(&"mem_used_percentage".to_string()));
        assert!(!profile.left.columns.contains(&"mem_used_percentage".to_string()));
    }

    #[test]
    fn test_profile_by_name() {
        assert_eq!(DatasetProfile::by_name("energy", None).unwrap().name, ENERGY_PROFILE);
        assert!(DatasetProfile::by_name("vm-power", Some("k8s")).unwrap().filter.is_some());
        assert!(DatasetProfile::by_name("solar", None).is_none());
    }
}
