//! EC2 pass-through calls: running-instance inventory, launch templates,
//! and launching one instance from a template.

use serde::Serialize;

use crate::config::AwsSettings;

use super::{query_request, xml, ApiError};

const EC2_API_VERSION: &str = "2016-11-15";

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub instance_type: String,
    pub state: String,
    pub public_ip: Option<String>,
    pub key_name: Option<String>,
    pub launch_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub created: Option<String>,
}

#[derive(Clone)]
pub struct Ec2Client {
    http: reqwest::Client,
    settings: AwsSettings,
}

impl Ec2Client {
    pub fn new(http: reqwest::Client, settings: AwsSettings) -> Self {
        Self { http, settings }
    }

    /// Running instances only, flattened across reservations.
    pub async fn running_instances(&self) -> Result<Vec<InstanceSummary>, ApiError> {
        let body = query_request(
            &self.http,
            &self.settings,
            "ec2",
            EC2_API_VERSION,
            "DescribeInstances",
            &[
                ("Filter.1.Name", "instance-state-name"),
                ("Filter.1.Value.1", "running"),
            ],
        )
        .await?;

        let mut instances = Vec::new();
        for reservation in xml::tag_blocks(&body, "reservationSet") {
            for item in xml::tag_blocks(reservation, "item") {
                for set in xml::tag_blocks(item, "instancesSet") {
                    for inst in xml::tag_blocks(set, "item") {
                        let Some(id) = xml::tag_text(inst, "instanceId") else { continue };
                        let state = xml::tag_blocks(inst, "instanceState")
                            .first()
                            .and_then(|s| xml::tag_text(s, "name"))
                            .unwrap_or_default();
                        instances.push(InstanceSummary {
                            id,
                            instance_type: xml::tag_text(inst, "instanceType").unwrap_or_default(),
                            state,
                            public_ip: xml::tag_text(inst, "ipAddress"),
                            key_name: xml::tag_text(inst, "keyName"),
                            launch_time: xml::tag_text(inst, "launchTime"),
                        });
                    }
                }
            }
        }
        Ok(instances)
    }

    pub async fn launch_templates(&self) -> Result<Vec<TemplateSummary>, ApiError> {
        let body = query_request(
            &self.http,
            &self.settings,
            "ec2",
            EC2_API_VERSION,
            "DescribeLaunchTemplates",
            &[],
        )
        .await?;

        let mut templates = Vec::new();
        for set in xml::tag_blocks(&body, "launchTemplates") {
            for item in xml::tag_blocks(set, "item") {
                let Some(id) = xml::tag_text(item, "launchTemplateId") else { continue };
                templates.push(TemplateSummary {
                    id,
                    name: xml::tag_text(item, "launchTemplateName").unwrap_or_default(),
                    created: xml::tag_text(item, "createTime"),
                });
            }
        }
        Ok(templates)
    }

    /// Instance state name from the status checks for one instance, or
    /// `None` when the instance has not reported a status yet.
    pub async fn instance_status(&self, instance_id: &str) -> Result<Option<String>, ApiError> {
        let body = query_request(
            &self.http,
            &self.settings,
            "ec2",
            EC2_API_VERSION,
            "DescribeInstanceStatus",
            &[("InstanceId.1", instance_id)],
        )
        .await?;
        Ok(instance_status_from(&body))
    }

    /// Launch a single instance from a template's default version. Returns
    /// the new instance id.
    pub async fn launch_from_template(&self, template_id: &str) -> Result<String, ApiError> {
        let body = query_request(
            &self.http,
            &self.settings,
            "ec2",
            EC2_API_VERSION,
            "RunInstances",
            &[
                ("LaunchTemplate.LaunchTemplateId", template_id),
                ("LaunchTemplate.Version", "$Default"),
                ("MinCount", "1"),
                ("MaxCount", "1"),
            ],
        )
        .await?;
        xml::tag_text(&body, "instanceId")
            .ok_or_else(|| ApiError::transport("run instances response missing instanceId"))
    }
}

fn instance_status_from(body: &str) -> Option<String> {
    let sets = xml::tag_blocks(body, "instanceStatusSet");
    let items = xml::tag_blocks(sets.first()?, "item");
    xml::tag_blocks(items.first()?, "instanceState")
        .first()
        .and_then(|s| xml::tag_text(s, "name"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_status_reads_state_name() {
        let body = "<DescribeInstanceStatusResponse><requestId>r</requestId>\
            <instanceStatusSet><item>\
            <instanceId>i-0abc</instanceId>\
            <instanceState><code>16</code><name>running</name></instanceState>\
            <systemStatus><status>ok</status><details><item><name>reachability</name>\
            <status>passed</status></item></details></systemStatus>\
            </item></instanceStatusSet></DescribeInstanceStatusResponse>";
        assert_eq!(instance_status_from(body).as_deref(), Some("running"));
    }

    #[test]
    fn unreported_instance_has_no_status() {
        let body = "<DescribeInstanceStatusResponse><requestId>r</requestId>\
            <instanceStatusSet/></DescribeInstanceStatusResponse>";
        assert_eq!(instance_status_from(body), None);
    }
}
