use serde::{Deserialize, Serialize};

/// Repository metadata needed to crawl a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Absent when the upstream has no default branch; callers that need one must fail.
    pub default_branch: Option<String>,
    pub is_fork: bool,
    pub owner: String,
    pub name: String,
}

impl Repository {
    /// `owner/name`, used to key per-repository data such as decoded manifests.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct Owner {
    pub login: String,
}

/// `GET /repos/{owner}/{name}` payload, reduced to what we use.
#[derive(Debug, Deserialize)]
pub(super) struct RestRepository {
    pub default_branch: Option<String>,
    #[serde(default)]
    pub fork: bool,
    pub name: String,
    pub owner: Owner,
}

impl From<RestRepository> for Repository {
    fn from(r: RestRepository) -> Self {
        Self {
            default_branch: r.default_branch,
            is_fork: r.fork,
            owner: r.owner.login,
            name: r.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BranchRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GraphQlRepository {
    pub name: String,
    pub is_fork: bool,
    pub default_branch_ref: Option<BranchRef>,
    pub owner: Owner,
}

impl From<GraphQlRepository> for Repository {
    fn from(r: GraphQlRepository) -> Self {
        Self {
            default_branch: r.default_branch_ref.map(|b| b.name),
            is_fork: r.is_fork,
            owner: r.owner.login,
            name: r.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct GraphQlData {
    pub repository: Option<GraphQlRepository>,
}

#[derive(Debug, Deserialize)]
pub(super) struct GraphQlError {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct GraphQlResponse {
    pub data: Option<GraphQlData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

/// `GET /repos/{owner}/{name}/git/trees/{branch}` payload.
#[derive(Debug, Deserialize)]
pub(super) struct Tree {
    pub tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_repository_deserialize() {
        let json = r#"{
            "name": "Alamofire",
            "full_name": "Alamofire/Alamofire",
            "default_branch": "master",
            "fork": false,
            "owner": { "login": "Alamofire", "id": 7774181 }
        }"#;

        let repo: Repository = serde_json::from_str::<RestRepository>(json).unwrap().into();
        assert_eq!(repo.default_branch.as_deref(), Some("master"));
        assert!(!repo.is_fork);
        assert_eq!(repo.identity(), "Alamofire/Alamofire");
    }

    #[test]
    fn test_rest_repository_missing_default_branch() {
        let json = r#"{ "name": "x", "fork": true, "owner": { "login": "o" } }"#;
        let repo: Repository = serde_json::from_str::<RestRepository>(json).unwrap().into();
        assert!(repo.default_branch.is_none());
        assert!(repo.is_fork);
    }

    #[test]
    fn test_graphql_response_deserialize() {
        let json = r#"{
            "data": { "repository": {
                "name": "bar", "isFork": true,
                "defaultBranchRef": { "name": "main" },
                "owner": { "login": "foo" }
            } }
        }"#;

        let response: GraphQlResponse = serde_json::from_str(json).unwrap();
        let repo: Repository = response.data.unwrap().repository.unwrap().into();
        assert!(repo.is_fork);
        assert_eq!(repo.default_branch.as_deref(), Some("main"));
        assert!(response.errors.is_empty());
    }

    #[test]
    fn test_graphql_not_found_deserialize() {
        let json = r#"{
            "data": { "repository": null },
            "errors": [{
                "type": "NOT_FOUND",
                "path": ["repository"],
                "locations": [{ "line": 1, "column": 9 }],
                "message": "Could not resolve to a Repository with the name 'foo/bar'."
            }]
        }"#;

        let response: GraphQlResponse = serde_json::from_str(json).unwrap();
        assert!(response.data.unwrap().repository.is_none());
        assert_eq!(response.errors[0].kind.as_deref(), Some("NOT_FOUND"));
        assert_eq!(response.errors[0].path.len(), 1);
    }

    #[test]
    fn test_tree_deserialize() {
        let json = r#"{ "sha": "abc", "tree": [
            { "path": "Package.swift", "type": "blob" },
            { "path": "Sources", "type": "tree" }
        ], "truncated": false }"#;

        let tree: Tree = serde_json::from_str(json).unwrap();
        assert_eq!(tree.tree.len(), 2);
        assert_eq!(tree.tree[1].kind, "tree");
    }
}
