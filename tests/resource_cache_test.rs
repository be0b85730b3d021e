use drift_ngin::{
    data_structures::{geometry::GeometryBuffer, texture::Texture},
    device::{Topology, recording::RecordingDevice},
    error::RenderError,
    resources::{Resource, ResourceCache, ResourceError, ResourceKind, mesh},
};

mod common;

use common::test_utils::temp_assets;

const MESH: &str = "# four corners\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3\n";

#[tokio::test]
async fn should_load_each_kind_once() {
    let root = temp_assets("each-kind");
    std::fs::write(root.join("flat.wgsl"), "fn vs_main() {}").unwrap();
    std::fs::write(root.join("blob.bin"), [1u8, 2, 3]).unwrap();
    std::fs::write(root.join("scene.json"), r#"{ "cubes": 9 }"#).unwrap();

    let mut cache = ResourceCache::new(&root);
    assert_eq!(cache.text("flat.wgsl").await.unwrap(), "fn vs_main() {}");
    assert_eq!(cache.binary("blob.bin").await.unwrap(), [1, 2, 3]);
    assert_eq!(cache.json("scene.json").await.unwrap()["cubes"], 9);
    assert_eq!(cache.len(), 3);

    // cached entries survive their file
    std::fs::remove_file(root.join("flat.wgsl")).unwrap();
    assert!(matches!(
        cache.load(ResourceKind::Text, "flat.wgsl").await,
        Ok(Resource::Text(_))
    ));
    assert_eq!(
        cache.get("blob.bin"),
        Some(&Resource::Binary(vec![1, 2, 3]))
    );
}

#[tokio::test]
async fn should_report_bad_json_and_bad_utf8() {
    let root = temp_assets("bad-content");
    std::fs::write(root.join("broken.json"), "{ nope").unwrap();
    std::fs::write(root.join("latin1.txt"), [0xff, 0xfe, 0x41]).unwrap();

    let mut cache = ResourceCache::new(&root);
    assert!(matches!(
        cache.json("broken.json").await,
        Err(ResourceError::Json { .. })
    ));
    assert!(matches!(
        cache.text("latin1.txt").await,
        Err(ResourceError::Utf8 { .. })
    ));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn should_build_geometry_from_a_cached_mesh() {
    let root = temp_assets("mesh");
    std::fs::write(root.join("quad.obj"), MESH).unwrap();

    let mut cache = ResourceCache::new(&root);
    let (vertices, indices) = mesh::parse(cache.text("quad.obj").await.unwrap());
    assert_eq!(vertices.len(), 20);
    assert_eq!(indices, [1, 2, 3, 0, 0]);

    let mut device = RecordingDevice::new();
    let geometry =
        GeometryBuffer::new(&mut device, &vertices, &indices, Topology::TriangleList).unwrap();
    assert_eq!(geometry.index_count(), 5);
}

#[tokio::test]
async fn should_reject_faces_that_point_past_the_last_vertex() {
    let root = temp_assets("one-based");
    // three vertices, one-based face: index 3 does not exist
    std::fs::write(root.join("tri.obj"), "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

    let mut cache = ResourceCache::new(&root);
    let (vertices, indices) = mesh::parse(cache.text("tri.obj").await.unwrap());
    let mut device = RecordingDevice::new();
    let err = GeometryBuffer::new(&mut device, &vertices, &indices, Topology::TriangleList)
        .unwrap_err();

    assert!(matches!(err, RenderError::IndexOutOfRange { index: 3, .. }));
}

#[tokio::test]
async fn should_decode_textures_from_binary_resources() {
    let root = temp_assets("texture");
    image::RgbaImage::from_pixel(3, 5, image::Rgba([9, 9, 9, 255]))
        .save(root.join("grey.png"))
        .unwrap();

    let mut cache = ResourceCache::new(&root);
    let mut device = RecordingDevice::new();
    let texture = Texture::from_bytes(&mut device, cache.binary("grey.png").await.unwrap(), Some("png"))
        .unwrap();

    assert_eq!((texture.width(), texture.height()), (3, 5));
    assert_eq!(device.live_textures(), 1);
}
