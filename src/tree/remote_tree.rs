use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use super::path::normalize_path;
use super::{ListEntry, Result, Tree, TreeError};

/// A [`Tree`] backed by a separately deployed HTTP tree service.
///
/// Every operation is one outbound call against the service's
/// per-project surface (`getfile`, `putfile`, `movefile`, `deletepath`,
/// `listfiles`). Failures surface as [`TreeError::Remote`] carrying the
/// status and response body. No retries happen at this layer: retry
/// policy belongs to the caller, because blindly retrying a
/// non-idempotent `putfile` could duplicate side effects.
pub struct RemoteTree {
    client: Client,
    base_url: String,
    project_name: String,
}

impl RemoteTree {
    /// Create a remote tree for one project against the given base URL.
    pub fn new(base_url: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, project_name)
    }

    /// Create a remote tree with a custom reqwest client (e.g. one
    /// carrying a network timeout).
    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        project_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_name: project_name.into(),
        }
    }

    fn op_url(&self, op: &str, path: &str) -> String {
        format!(
            "{}/tree/{}/{}/{}",
            self.base_url, self.project_name, op, path
        )
    }

    async fn remote_error(response: reqwest::Response) -> TreeError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        TreeError::Remote { status, body }
    }
}

#[async_trait]
impl Tree for RemoteTree {
    async fn get_file_contents(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_path(path)?;
        let response = self.client.get(self.op_url("getfile", &path)).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.bytes().await?.to_vec())),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::remote_error(response).await),
        }
    }

    async fn set_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let path = normalize_path(path)?;
        let response = self
            .client
            .put(self.op_url("putfile", &path))
            .body(content)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::remote_error(response).await)
        }
    }

    async fn move_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;
        let response = self
            .client
            .post(self.op_url("movefile", &old_path))
            .query(&[("newpath", new_path.as_str())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(TreeError::NotFound(old_path)),
            _ => Err(Self::remote_error(response).await),
        }
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let response = self
            .client
            .post(self.op_url("deletepath", &path))
            .send()
            .await?;

        match response.status() {
            // deleting an absent path is a no-op on both sides
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(Self::remote_error(response).await),
        }
    }

    async fn list_directory(&self, path: Option<&str>) -> Result<Vec<ListEntry>> {
        let dir = match path {
            Some(p) => normalize_path(p)?,
            None => String::new(),
        };
        let response = self
            .client
            .get(self.op_url("listfiles", &dir))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::remote_error(response).await)
        }
    }

    async fn clear(&self) -> Result<()> {
        let url = format!("{}/tree/{}/clear", self.base_url, self.project_name);
        let response = self.client.post(url).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::remote_error(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_file_contents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tree/proj/getfile/app.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"runtime: python".to_vec()))
            .mount(&server)
            .await;

        let tree = RemoteTree::new(server.uri(), "proj");
        assert_eq!(
            tree.get_file_contents("app.yaml").await.unwrap(),
            Some(b"runtime: python".to_vec())
        );
    }

    #[tokio::test]
    async fn test_get_absent_file_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tree/proj/getfile/missing.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tree = RemoteTree::new(server.uri(), "proj");
        assert_eq!(tree.get_file_contents("missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_file_puts_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tree/proj/putfile/main.py"))
            .and(body_bytes(b"print('hi')".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        let tree = RemoteTree::new(server.uri(), "proj");
        tree.set_file("main.py", b"print('hi')".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_move_missing_file_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tree/proj/movefile/old.txt"))
            .and(query_param("newpath", "new.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tree = RemoteTree::new(server.uri(), "proj");
        let err = tree.move_file("old.txt", "new.txt").await.unwrap_err();
        assert!(matches!(err, TreeError::NotFound(p) if p == "old.txt"));
    }

    #[tokio::test]
    async fn test_list_directory_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tree/proj/listfiles/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"name":"a","isDirectory":true},{"name":"b.txt","isDirectory":false}]"#,
            ))
            .mount(&server)
            .await;

        let tree = RemoteTree::new(server.uri(), "proj");
        let entries = tree.list_directory(None).await.unwrap();
        assert_eq!(
            entries,
            vec![
                ListEntry {
                    name: "a".to_string(),
                    is_directory: true
                },
                ListEntry {
                    name: "b.txt".to_string(),
                    is_directory: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tree/proj/getfile/app.yaml"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let tree = RemoteTree::new(server.uri(), "proj");
        let err = tree.get_file_contents("app.yaml").await.unwrap_err();
        assert!(matches!(err, TreeError::Remote { status: 500, ref body } if body == "boom"));
    }
}
