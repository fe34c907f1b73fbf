//! Status-driven sync/finalize transitions (C7), grounded on
//! `server/vpc/actions.go`'s `CreateSyncAction`/`CreateFinalizeAction`.

use crate::vpc::{instance, instance::Instance, service::VpcService, tagging};
use hpcr_definitions::options::VpcInstanceOptions;
use hpcr_definitions::ResourceStatus;

/// All of vpc/zone/image/profile/subnet match the desired options, and the
/// expected content-hash tag is attached — `isVsiConfigValid` in the original.
fn is_config_valid(opts: &VpcInstanceOptions, found: &Instance, tags: &[String]) -> bool {
    found.vpc_id == opts.vpc_id
        && found.zone_name == opts.zone_name
        && found.image_id == opts.image_id
        && found.profile_name == opts.profile_name
        && found.subnet_id == opts.subnet_id
        && tagging::has_tag(tags, &tagging::content_hash_tag(&opts.user_data))
}

fn delete_and_wait(service: &VpcService, found: &Instance, reason: &str) -> crate::Result<ResourceStatus> {
    instance::delete_instance(service, &found.id)?;
    info!("deleted VPC instance [{}]: {}", found.id, reason);
    Ok(ResourceStatus::waiting(reason))
}

pub fn sync(service: &VpcService, gt_endpoint: &str, opts: &VpcInstanceOptions) -> crate::Result<ResourceStatus> {
    let found = match instance::find_instance(service, &opts.name)? {
        None => {
            info!("VPC instance [{}] not found, creating it", opts.name);
            let created = instance::create_instance(service, opts)?;
            let tag = tagging::content_hash_tag(&opts.user_data);
            tagging::attach_tag(service, gt_endpoint, &created.crn, &tag)?;
            return Ok(ResourceStatus::waiting("instance created"));
        }
        Some(found) => found,
    };

    match found.status.as_str() {
        "deleting" => Ok(ResourceStatus::waiting("instance is deleting")),
        "failed" | "stopped" | "stopping" | "restarting" => delete_and_wait(service, &found, "instance in a terminal state"),
        "pending" | "starting" => {
            let tags = tagging::list_tags(service, gt_endpoint, &found.crn)?;
            if is_config_valid(opts, &found, &tags) {
                Ok(ResourceStatus::waiting("instance is starting"))
            } else {
                delete_and_wait(service, &found, "instance configuration drifted")
            }
        }
        "running" => {
            let tags = tagging::list_tags(service, gt_endpoint, &found.crn)?;
            if is_config_valid(opts, &found, &tags) {
                Ok(ResourceStatus::ready(found.id.clone()).with_metadata("instance", found.raw.clone()))
            } else {
                delete_and_wait(service, &found, "instance configuration drifted")
            }
        }
        other => delete_and_wait(service, &found, &format!("instance in unexpected state '{}'", other)),
    }
}

pub fn finalize(service: &VpcService, name: &str) -> crate::Result<ResourceStatus> {
    match instance::find_instance(service, name)? {
        None => Ok(ResourceStatus::ready("instance already absent")),
        Some(found) if found.status == "deleting" => Ok(ResourceStatus::waiting("instance is deleting")),
        Some(found) => delete_and_wait(service, &found, "finalizing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opts() -> VpcInstanceOptions {
        VpcInstanceOptions {
            name: "hpcr-controller-abc".to_string(),
            vpc_id: "vpc-1".to_string(),
            profile_name: "bz2e-2x8".to_string(),
            image_id: "img-1".to_string(),
            zone_name: "us-south-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            user_data: "userdata".to_string(),
        }
    }

    fn matching_instance() -> Instance {
        Instance {
            id: "inst-1".to_string(),
            crn: "crn:v1:inst-1".to_string(),
            status: "running".to_string(),
            vpc_id: "vpc-1".to_string(),
            zone_name: "us-south-1".to_string(),
            image_id: "img-1".to_string(),
            profile_name: "bz2e-2x8".to_string(),
            subnet_id: "subnet-1".to_string(),
            raw: json!({}),
        }
    }

    #[test]
    fn config_is_valid_when_every_field_and_tag_matches() {
        let found = matching_instance();
        let tags = vec![tagging::content_hash_tag("userdata")];
        assert!(is_config_valid(&opts(), &found, &tags));
    }

    #[test]
    fn config_is_invalid_when_the_tag_is_missing() {
        let found = matching_instance();
        assert!(!is_config_valid(&opts(), &found, &[]));
    }

    #[test]
    fn config_is_invalid_on_profile_drift() {
        let mut found = matching_instance();
        found.profile_name = "bz2e-4x16".to_string();
        let tags = vec![tagging::content_hash_tag("userdata")];
        assert!(!is_config_valid(&opts(), &found, &tags));
    }
}
