use std::env;
use std::path::PathBuf;

use crate::error::Error;

/// Environment variable carrying the suite image reference. Re-injected
/// into every scheduled pod so workers can schedule further workloads.
pub const ENV_IMAGE: &str = "SKIFF_IMAGE";
/// Environment variable carrying the session ID into scheduled pods.
/// Its presence marks the process as a worker.
pub const ENV_SESSION_ID: &str = "SKIFF_SESSION_ID";
/// Environment variable carrying the pod's own name (downward API).
pub const ENV_POD_NAME: &str = "SKIFF_POD_NAME";

const ENV_UID: &str = "SKIFF_UID";
const ENV_IMAGE_PULL_POLICY: &str = "SKIFF_IMAGE_PULL_POLICY";
const ENV_KUBECONFIG: &str = "SKIFF_KUBECONFIG";

/// Process configuration, bound from `SKIFF_*` environment variables once
/// at bootstrap.
#[derive(Debug, Clone)]
pub struct Config {
    /// Image every scheduled job runs. The image entrypoint must invoke
    /// the compiled suite binary.
    pub image: String,
    /// Numeric user/group ID the job containers run as.
    pub uid: i64,
    pub image_pull_policy: String,
    /// Explicit kubeconfig path; cluster configuration is inferred when
    /// unset (in-cluster service account, then the conventional default).
    pub kubeconfig_path: Option<PathBuf>,
    /// Session ID handed down by the driver that scheduled this process.
    pub session_id: Option<String>,
    /// This process's runtime identity, injected at workload-start time.
    pub pod_name: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(get: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let image = get(ENV_IMAGE)
            .filter(|value| !value.is_empty())
            .ok_or(Error::MissingImage)?;
        let uid = get(ENV_UID)
            .and_then(|value| value.parse().ok())
            .unwrap_or(1000);
        let image_pull_policy =
            get(ENV_IMAGE_PULL_POLICY).unwrap_or_else(|| "Always".to_string());
        let kubeconfig_path = get(ENV_KUBECONFIG)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        let session_id = get(ENV_SESSION_ID).filter(|value| !value.is_empty());
        let pod_name = get(ENV_POD_NAME).filter(|value| !value.is_empty());

        Ok(Self {
            image,
            uid,
            image_pull_policy,
            kubeconfig_path,
            session_id,
            pod_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&'a str, &'a str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|value| value.to_string())
    }

    #[test]
    fn image_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingImage));
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[(ENV_IMAGE, "registry/suite:1")])).unwrap();
        assert_eq!(config.uid, 1000);
        assert_eq!(config.image_pull_policy, "Always");
        assert!(config.kubeconfig_path.is_none());
        assert!(config.session_id.is_none());
        assert!(config.pod_name.is_none());
    }

    #[test]
    fn overrides_are_bound() {
        let config = Config::from_lookup(lookup(&[
            (ENV_IMAGE, "registry/suite:1"),
            ("SKIFF_UID", "2000"),
            ("SKIFF_IMAGE_PULL_POLICY", "IfNotPresent"),
            (ENV_SESSION_ID, "ab12cd34"),
            (ENV_POD_NAME, "ska1b2c3d4-xyz12"),
        ]))
        .unwrap();
        assert_eq!(config.uid, 2000);
        assert_eq!(config.image_pull_policy, "IfNotPresent");
        assert_eq!(config.session_id.as_deref(), Some("ab12cd34"));
        assert_eq!(config.pod_name.as_deref(), Some("ska1b2c3d4-xyz12"));
    }

    #[test]
    fn unparsable_uid_falls_back() {
        let config = Config::from_lookup(lookup(&[
            (ENV_IMAGE, "registry/suite:1"),
            ("SKIFF_UID", "not-a-number"),
        ]))
        .unwrap();
        assert_eq!(config.uid, 1000);
    }
}
