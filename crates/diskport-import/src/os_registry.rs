//! Supported operating systems
//!
//! Static table mapping an OS identifier to the license attached to imported disks
//! and the translation workflow that prepares the guest for the platform.

use diskport_import_types::OsRelease;

/// Registry entry for one OS identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsEntry {
    pub id: &'static str,
    pub license: &'static str,
    /// Translation workflow, relative to the workflow directory
    pub workflow: &'static str,
}

const BYOL_SUFFIX: &str = "-byol";

macro_rules! os {
    ($id:expr, $license:expr, $workflow:expr) => {
        OsEntry {
            id: $id,
            license: $license,
            workflow: $workflow,
        }
    };
}

static REGISTRY: &[OsEntry] = &[
    os!("centos-7", "projects/centos-cloud/global/licenses/centos-7", "enterprise_linux/translate_centos_7.wf.json"),
    os!("centos-8", "projects/centos-cloud/global/licenses/centos-8", "enterprise_linux/translate_centos_8.wf.json"),
    os!("debian-9", "projects/debian-cloud/global/licenses/debian-9-stretch", "debian/translate_debian_9.wf.json"),
    os!("debian-10", "projects/debian-cloud/global/licenses/debian-10-buster", "debian/translate_debian_10.wf.json"),
    os!("debian-11", "projects/debian-cloud/global/licenses/debian-11-bullseye", "debian/translate_debian_11.wf.json"),
    os!("debian-12", "projects/debian-cloud/global/licenses/debian-12-bookworm", "debian/translate_debian_12.wf.json"),
    os!("opensuse-15", "projects/opensuse-cloud/global/licenses/opensuse-leap", "suse/translate_opensuse_15.wf.json"),
    os!("rhel-7", "projects/rhel-cloud/global/licenses/rhel-7-server", "enterprise_linux/translate_rhel_7_licensed.wf.json"),
    os!("rhel-7-byol", "projects/rhel-cloud/global/licenses/rhel-7-byos", "enterprise_linux/translate_rhel_7_byol.wf.json"),
    os!("rhel-8", "projects/rhel-cloud/global/licenses/rhel-8-server", "enterprise_linux/translate_rhel_8_licensed.wf.json"),
    os!("rhel-8-byol", "projects/rhel-cloud/global/licenses/rhel-8-byos", "enterprise_linux/translate_rhel_8_byol.wf.json"),
    os!("sles-12", "projects/suse-cloud/global/licenses/sles-12", "suse/translate_sles_12.wf.json"),
    os!("sles-12-byol", "projects/suse-byos-cloud/global/licenses/sles-12-byos", "suse/translate_sles_12_byol.wf.json"),
    os!("sles-15", "projects/suse-cloud/global/licenses/sles-15", "suse/translate_sles_15.wf.json"),
    os!("sles-15-byol", "projects/suse-byos-cloud/global/licenses/sles-15-byos", "suse/translate_sles_15_byol.wf.json"),
    os!("sles-sap-12", "projects/suse-sap-cloud/global/licenses/sles-sap-12", "suse/translate_sles_sap_12.wf.json"),
    os!("sles-sap-12-byol", "projects/suse-byos-cloud/global/licenses/sles-sap-12-byos", "suse/translate_sles_sap_12_byol.wf.json"),
    os!("sles-sap-15", "projects/suse-sap-cloud/global/licenses/sles-sap-15", "suse/translate_sles_sap_15.wf.json"),
    os!("sles-sap-15-byol", "projects/suse-byos-cloud/global/licenses/sles-sap-15-byos", "suse/translate_sles_sap_15_byol.wf.json"),
    os!("ubuntu-1804", "projects/ubuntu-os-cloud/global/licenses/ubuntu-1804-lts", "ubuntu/translate_ubuntu_1804.wf.json"),
    os!("ubuntu-2004", "projects/ubuntu-os-cloud/global/licenses/ubuntu-2004-lts", "ubuntu/translate_ubuntu_2004.wf.json"),
    os!("ubuntu-2204", "projects/ubuntu-os-cloud/global/licenses/ubuntu-2204-lts", "ubuntu/translate_ubuntu_2204.wf.json"),
    os!("windows-2012r2", "projects/windows-cloud/global/licenses/windows-server-2012-r2-dc", "windows/translate_windows_2012_r2.wf.json"),
    os!("windows-2016", "projects/windows-cloud/global/licenses/windows-server-2016-dc", "windows/translate_windows_2016.wf.json"),
    os!("windows-2019", "projects/windows-cloud/global/licenses/windows-server-2019-dc", "windows/translate_windows_2019.wf.json"),
    os!("windows-2022", "projects/windows-cloud/global/licenses/windows-server-2022-dc", "windows/translate_windows_2022.wf.json"),
    os!("windows-10-x64-byol", "projects/windows-cloud/global/licenses/windows-10-x64-byol", "windows/translate_windows_10_x64_byol.wf.json"),
    os!("windows-11-x64-byol", "projects/windows-cloud/global/licenses/windows-11-x64-byol", "windows/translate_windows_11_x64_byol.wf.json"),
];

/// Look up an OS identifier
pub fn lookup(os: &str) -> Option<&'static OsEntry> {
    REGISTRY.iter().find(|entry| entry.id == os)
}

/// Identifier of the bring-your-own-license variant of `os`
pub fn byol_variant(os: &str) -> String {
    if os.ends_with(BYOL_SUFFIX) {
        os.to_string()
    } else {
        format!("{}{}", os, BYOL_SUFFIX)
    }
}

/// Comma-separated list of every supported identifier, for error messages
pub fn allowed_values() -> String {
    let mut ids: Vec<&str> = REGISTRY.iter().map(|entry| entry.id).collect();
    ids.sort_unstable();
    ids.join(", ")
}

pub fn is_windows(os: &str) -> bool {
    os.starts_with("windows")
}

/// Identifier an inspected OS release would have, whether or not it is supported
pub fn candidate_id(release: &OsRelease) -> Option<String> {
    let distro = release.distro.trim().to_ascii_lowercase();
    let major = release.major_version.trim();
    if distro.is_empty() || major.is_empty() {
        return None;
    }

    let candidate = match distro.as_str() {
        "ubuntu" => format!("ubuntu-{}{}", major, release.minor_version.trim()),
        "sles_sap" | "sles-sap" => format!("sles-sap-{}", major),
        "redhat" | "rhel" => format!("rhel-{}", major),
        "opensuse-leap" | "opensuse" => format!("opensuse-{}", major),
        other => format!("{}-{}", other, major),
    };
    Some(candidate)
}

/// Registry identifier for an OS found by inspection
pub fn os_id_from_release(release: &OsRelease) -> Option<&'static str> {
    candidate_id(release)
        .as_deref()
        .and_then(lookup)
        .map(|entry| entry.id)
}
