// ABOUTME: Service roles the pipeline and hosts assume.

use super::resource::{PolicyStatement, ResourceSpec};

pub const SSM_ROLE: &str = "ssm-role";
pub const BUILD_ROLE: &str = "codebuild-role";
pub const PIPELINE_ROLE: &str = "pipeline-role";

const PIPELINE_ACTIONS: &[&str] = &[
    "codebuild:BatchGetBuilds",
    "codebuild:StartBuild",
    "codecommit:CancelUploadArchive",
    "codecommit:GetBranch",
    "codecommit:GetCommit",
    "codecommit:GetRepository",
    "codecommit:GetUploadArchiveStatus",
    "codecommit:UploadArchive",
    "ec2:*",
    "ecr:DescribeImages",
    "ecs:*",
    "elasticloadbalancing:*",
    "cloudwatch:*",
    "s3:*",
];

pub fn default_roles() -> Vec<ResourceSpec> {
    let everything = vec!["*".to_string()];
    vec![
        ResourceSpec::Role {
            name: SSM_ROLE.to_string(),
            principal: "ec2".to_string(),
            managed_policies: vec!["AmazonSSMManagedInstanceCore".to_string()],
            inline_statements: Vec::new(),
        },
        ResourceSpec::Role {
            name: BUILD_ROLE.to_string(),
            principal: "codebuild".to_string(),
            managed_policies: vec!["AmazonEC2ContainerRegistryFullAccess".to_string()],
            inline_statements: Vec::new(),
        },
        ResourceSpec::Role {
            name: PIPELINE_ROLE.to_string(),
            principal: "codepipeline".to_string(),
            managed_policies: Vec::new(),
            inline_statements: vec![
                PolicyStatement {
                    actions: PIPELINE_ACTIONS.iter().map(|a| a.to_string()).collect(),
                    resources: everything.clone(),
                },
                PolicyStatement {
                    actions: vec!["iam:PassRole".to_string()],
                    resources: everything,
                },
            ],
        },
    ]
}
