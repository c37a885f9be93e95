use const_format::formatcp;

// Input locations

/// Directory holding the site defaults table and the switch registry.
pub const SANPLAN_CONFIG_DIR: &str = "/etc/sanplan";

/// Default path of the site-keyed defaults table.
pub const DEFAULTS_PATH_DEFAULT: &str = formatcp!("{SANPLAN_CONFIG_DIR}/sanplan.conf");

/// Default path of the known-switch registry.
pub const SWITCHES_PATH_DEFAULT: &str = formatcp!("{SANPLAN_CONFIG_DIR}/switches.conf");

// Defaults table

/// Section of the defaults table holding project-wide settings.
pub const GLOBAL_SECTION: &str = "global";

/// Prefix of the iSCSI CHAP password when the defaults table has none.
pub const DEFAULT_CHAP_PREFIX: &str = "docgen";

// Volume defaults

/// Usable size, in GB, of a volume that does not declare one.
pub const DEFAULT_USABLE_GB: f64 = 100.0;

/// Usable and raw size, in GB, of a partition root volume.
pub const ROOT_VOLUME_SIZE_GB: f64 = 0.02;

/// Suffix appended to the project short name for partition root volumes.
pub const ROOT_VOLUME_SUFFIX: &str = "_root";

/// Snapshot reserve of a partition root volume.
pub const ROOT_VOLUME_RESERVE: f64 = 20.0;

/// Prefix of the vault reference attached to primary root volumes.
pub const ROOT_VAULT_SET_PREFIX: &str = "default_";

/// Default snapshot reserve for file-serving volumes.
pub const DEFAULT_RESERVE: f64 = 20.0;

/// Default snapshot reserve for archive and undo workloads.
pub const ARCHIVE_RESERVE: f64 = 50.0;

/// Default iSCSI snapshot space percentage.
pub const DEFAULT_ISCSI_SNAPSPACE: f64 = 30.0;

/// Volume options applied when a volume declares none.
pub const DEFAULT_VOLUME_OPTIONS: [&str; 3] = ["nvfail=on", "create_ucode=on", "convert_ucode=on"];

/// Smallest usable size, in GB, of a cluster-membership volume.
pub const MINIMUM_CM_VOLUME_GB: f64 = 0.1;

// Volume set layout

/// Share of a volume set's total that the data volume represents.
pub const VOLUME_SET_DATA_SHARE: f64 = 0.4;

// Protection defaults

/// Vault target size as a multiple of the source usable size.
pub const DEFAULT_VAULT_MULTIPLIER: f64 = 2.5;

/// Suffix of vault target volume names.
pub const DEFAULT_VAULT_SUFFIX: &str = "b";

/// Suffix of mirror target volume names.
pub const DEFAULT_MIRROR_SUFFIX: &str = "r";

// Network defaults

/// Netmask of a partition primary address that does not declare one.
pub const DEFAULT_PARTITION_NETMASK: &str = "255.255.255.254";

/// MTU of a VLAN that does not declare one.
pub const DEFAULT_VLAN_MTU: u32 = 9000;

/// Longest NetBIOS name accepted by the storage controllers.
pub const NETBIOS_NAME_MAX: usize = 15;
