use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use poem::http::StatusCode;
use poem::test::{TestClient, TestResponse};
use poem::web::headers;
use poem::Endpoint;
use tempfile::TempDir;
use uuid::Uuid;

use crate::controller::{UploadCoordinator, MAX_UPLOAD_SIZE};
use crate::identity::{IdentityProvider, TokenTable};
use crate::processor::{ImageTransformer, TransformSettings};
use crate::records::{MemoryRecordStore, UploadRecordStore};
use crate::resolver::FileResolver;
use crate::routes::{self, StowageApi};
use crate::storage::BlobStore;

const BOUNDARY: &str = "stowage-test-boundary";

struct Environment<E> {
    app: TestClient<E>,
    alice: String,
    bob: String,
    root: TempDir,
}

async fn setup_environment() -> anyhow::Result<Environment<impl Endpoint>> {
    setup_environment_with_limit(MAX_UPLOAD_SIZE).await
}

async fn setup_environment_with_limit(limit: usize) -> anyhow::Result<Environment<impl Endpoint>> {
    let root = tempfile::tempdir()?;

    let records: Arc<dyn UploadRecordStore> = Arc::new(MemoryRecordStore::new());
    let blobs = BlobStore::new(root.path());
    let transformer = ImageTransformer::new(
        FileResolver::new(records.clone()),
        blobs.clone(),
        TransformSettings::default(),
        None,
    );
    let coordinator = UploadCoordinator::new(blobs, records, transformer)
        .with_max_upload_size(limit);

    let identity = TokenTable::default();
    let alice = identity.issue(Uuid::new_v4());
    let bob = identity.issue(Uuid::new_v4());

    let api = StowageApi::new(Arc::new(coordinator), Arc::new(identity));
    let app = routes::build(api, "/v1", limit);

    Ok(Environment {
        app: TestClient::new(app),
        alice,
        bob,
        root,
    })
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

fn multipart(file_name: &str, data: &[u8], folder: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, file_name,
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(b"\r\n");

    if let Some(folder) = folder {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"folder\"\r\n\r\n{}\r\n",
                BOUNDARY, folder,
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn test_image() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(200, 100, |x, y| {
        Rgb([(x % 256) as u8, (y * 2 % 256) as u8, 64])
    }));
    let mut buff = Cursor::new(Vec::new());
    img.write_to(&mut buff, ImageFormat::Jpeg)
        .expect("encode test image");
    buff.into_inner()
}

async fn upload<E: Endpoint>(
    app: &TestClient<E>,
    token: &str,
    file_name: &str,
    data: &[u8],
    folder: Option<&str>,
) -> TestResponse {
    let body = multipart(file_name, data, folder);
    app.post("/v1/uploads")
        .header("Authorization", bearer(token))
        .content_type(format!("multipart/form-data; boundary={}", BOUNDARY))
        .typed_header(headers::ContentLength(body.len() as u64))
        .body(body)
        .send()
        .await
}

async fn bytes(res: TestResponse) -> anyhow::Result<Vec<u8>> {
    Ok(res.0.into_body().into_vec().await?)
}

async fn upload_id<E: Endpoint>(app: &TestClient<E>, token: &str, name: &str, data: &[u8]) -> anyhow::Result<String> {
    let res = upload(app, token, name, data, None).await;
    res.assert_status(StatusCode::OK);

    let info = res.json().await;
    Ok(info.value().object().get("uploadId").string().to_string())
}

#[tokio::test]
async fn test_upload_list_and_fetch() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    let res = upload(&env.app, &env.alice, "notes.txt", b"hello there", Some("docs")).await;
    res.assert_status(StatusCode::OK);
    let info = res.json().await;
    let info = info.value().object();
    let id = info.get("uploadId").string().to_string();
    info.get("checksum")
        .assert_i64(crc32fast::hash(b"hello there") as i64);

    let res = env
        .app
        .get("/v1/uploads")
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    let listed = res.json().await;
    let uploads = listed.value().object().get("uploads").array();
    uploads.assert_len(1);
    let first = uploads.get(0).object();
    first.get("id").assert_string(&id);
    assert!(first.get("filePath").string().ends_with("docs/notes.txt"));

    let res = env
        .app
        .get(format!("/v1/files/{}", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    res.assert_content_type("text/plain");
    assert_eq!(bytes(res).await?, b"hello there");

    Ok(())
}

#[tokio::test]
async fn test_requests_need_a_valid_token() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    let res = env
        .app
        .get("/v1/uploads")
        .header("Authorization", bearer("forged"))
        .send()
        .await;
    res.assert_status(StatusCode::UNAUTHORIZED);

    let res = upload(&env.app, "forged", "a.txt", b"data", None).await;
    res.assert_status(StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_other_owners_are_forbidden() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let id = upload_id(&env.app, &env.alice, "private.txt", b"mine").await?;

    let res = env
        .app
        .get(format!("/v1/uploads/{}", id))
        .header("Authorization", bearer(&env.bob))
        .send()
        .await;
    res.assert_status(StatusCode::FORBIDDEN);

    let res = env
        .app
        .delete(format!("/v1/uploads/{}", id))
        .header("Authorization", bearer(&env.bob))
        .send()
        .await;
    res.assert_status(StatusCode::FORBIDDEN);

    let res = env
        .app
        .get(format!("/v1/files/{}", id))
        .header("Authorization", bearer(&env.bob))
        .send()
        .await;
    res.assert_status(StatusCode::FORBIDDEN);

    let res = env
        .app
        .get(format!("/v1/uploads/{}", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let id = upload_id(&env.app, &env.alice, "temp.bin", b"\x00\x01\x02").await?;

    let res = env
        .app
        .delete(format!("/v1/uploads/{}", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);

    let res = env
        .app
        .get(format!("/v1/uploads/{}", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);

    let res = env
        .app
        .get(format!("/v1/files/{}", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_invalid_folder_is_rejected() -> anyhow::Result<()> {
    let env = setup_environment().await?;

    let res = upload(&env.app, &env.alice, "x.txt", b"data", Some("../../escape")).await;
    res.assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_image_resizing() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let id = upload_id(&env.app, &env.alice, "photo.jpg", &test_image()).await?;

    let res = env
        .app
        .get(format!("/v1/images/{}?w=100", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    res.assert_content_type("image/jpeg");

    let disposition = res
        .0
        .headers()
        .get("content-disposition")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    assert_eq!(disposition, Some(format!("inline; filename=\"image_{}.jpg\"", id)));

    let img = image::load_from_memory(&bytes(res).await?)?;
    assert_eq!(img.dimensions(), (100, 50));

    Ok(())
}

#[tokio::test]
async fn test_image_format_conversion() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let id = upload_id(&env.app, &env.alice, "photo.jpg", &test_image()).await?;

    let res = env
        .app
        .get(format!("/v1/images/{}?format=webp", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    res.assert_content_type("image/webp");

    let img = image::load_from_memory(&bytes(res).await?)?;
    assert_eq!(img.dimensions(), (200, 100));

    let res = env
        .app
        .get(format!("/v1/images/{}?w=5000&format=png", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    res.assert_content_type("image/png");
    let img = image::load_from_memory(&bytes(res).await?)?;
    assert_eq!(img.width(), 200);

    Ok(())
}

#[tokio::test]
async fn test_image_parameter_validation() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let id = upload_id(&env.app, &env.alice, "photo.jpg", &test_image()).await?;

    for query in ["q=150", "format=bmp", "w=-1"] {
        let res = env
            .app
            .get(format!("/v1/images/{}?{}", id, query))
            .header("Authorization", bearer(&env.alice))
            .send()
            .await;
        res.assert_status(StatusCode::BAD_REQUEST);
    }

    let text = upload_id(&env.app, &env.alice, "readme.txt", b"# hi").await?;
    let res = env
        .app
        .get(format!("/v1/images/{}", text))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_reads_without_a_body() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let id = upload_id(&env.app, &env.alice, "plain.txt", b"plain").await?;

    // Plain GET requests carry no Content-Length at all.
    let res = env
        .app
        .get(format!("/v1/uploads/{}", id))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    let info = res.json().await;
    info.value().object().get("id").assert_string(&id);

    let res = env
        .app
        .get(format!("/v1/uploads/{}", Uuid::new_v4()))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_list_order_after_delete() -> anyhow::Result<()> {
    let env = setup_environment().await?;
    let first = upload_id(&env.app, &env.alice, "one.txt", b"1").await?;
    let second = upload_id(&env.app, &env.alice, "two.txt", b"2").await?;
    let third = upload_id(&env.app, &env.alice, "three.txt", b"3").await?;
    upload_id(&env.app, &env.bob, "other.txt", b"4").await?;

    let res = env
        .app
        .delete(format!("/v1/uploads/{}", second))
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);

    let res = env
        .app
        .get("/v1/uploads")
        .header("Authorization", bearer(&env.alice))
        .send()
        .await;
    res.assert_status(StatusCode::OK);
    let listed = res.json().await;
    let uploads = listed.value().object().get("uploads").array();
    uploads.assert_len(2);
    uploads.get(0).object().get("id").assert_string(&first);
    uploads.get(1).object().get("id").assert_string(&third);

    Ok(())
}

#[tokio::test]
async fn test_oversized_uploads_are_refused() -> anyhow::Result<()> {
    let env = setup_environment_with_limit(1024).await?;

    // Small enough to get past the body limit, caught by the coordinator.
    let res = upload(&env.app, &env.alice, "big.bin", &vec![7u8; 2048], None).await;
    res.assert_status(StatusCode::BAD_REQUEST);

    // Refused on the declared length alone.
    let res = upload(&env.app, &env.alice, "huge.bin", &vec![7u8; 128 * 1024], None).await;
    res.assert_status(StatusCode::PAYLOAD_TOO_LARGE);

    assert!(std::fs::read_dir(env.root.path())?.next().is_none());

    Ok(())
}
