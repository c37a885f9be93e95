use serde::Serialize;

use super::VolumeId;

/// Local snapshot schedule of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    pub volume: VolumeId,
    pub weekly: u32,
    pub daily: u32,
    pub hourly: String,
}

impl Snapshot {
    /// Schedule string in `weekly daily hourly` form.
    pub fn schedule(&self) -> String {
        format!("{} {} {}", self.weekly, self.daily, self.hourly)
    }
}

/// Incremental backup relationship between two volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VaultCopy {
    pub source: VolumeId,
    pub target: VolumeId,
    pub basename: String,
    pub snap_schedule: Option<String>,
    pub vault_schedule: Option<String>,
}

/// Replica relationship between two volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MirrorCopy {
    pub source: VolumeId,
    pub target: VolumeId,
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub day_of_week: String,
    pub arguments: String,
}

impl MirrorCopy {
    /// Schedule in the four-field form used by snapmirror.conf.
    pub fn conf_schedule(&self) -> String {
        format!(
            "{} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.day_of_week
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedules() {
        let mirror = MirrorCopy {
            source: VolumeId(0),
            target: VolumeId(1),
            minute: "0".into(),
            hour: "*/4".into(),
            day_of_month: "*".into(),
            day_of_week: "*".into(),
            arguments: "-".into(),
        };
        assert_eq!(mirror.conf_schedule(), "0 */4 * *");

        let snapshot = Snapshot {
            volume: VolumeId(0),
            weekly: 4,
            daily: 14,
            hourly: "6@8,12,16,20".into(),
        };
        assert_eq!(snapshot.schedule(), "4 14 6@8,12,16,20");
    }
}
