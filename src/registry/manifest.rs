// SPDX-License-Identifier: Apache-2.0
use std::iter;
use actix_web::http::header::{Accept, Quality};
use bytes::Bytes;
use oci_spec::image::{Descriptor, ImageIndex, ImageManifest, MediaType};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use crate::error::error_kind::ErrorKind;
use crate::error::registry::RegistryError;
use crate::registry::digest::Digest;

pub const DOCKER_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const DOCKER_MANIFEST_V1_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

pub const SUPPORTED_MEDIA_TYPES: [&str; 6] = [
    DOCKER_MANIFEST_V1,
    DOCKER_MANIFEST_V1_SIGNED,
    DOCKER_MANIFEST_V2,
    DOCKER_MANIFEST_LIST,
    OCI_MANIFEST,
    OCI_INDEX,
];

/// Read first, to pick the schema the rest of the document follows
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    schema_version: u32,
    media_type: Option<String>,
    manifests: Option<serde_json::Value>,
}

/// Docker image manifest, schema 1
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SchemaV1 {
    fs_layers: Vec<FsLayer>,
    signatures: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FsLayer {
    blob_sum: String,
}

/// A manifest document checked against the schema of its media type.
/// Docker schema 2 documents share the OCI structure, only the media types differ.
enum Document {
    V1(SchemaV1),
    Image(ImageManifest),
    Index(ImageIndex),
}

impl Document {
    fn read(media_type: &str, content: &[u8]) -> Result<Document, RegistryError> {
        match media_type {
            DOCKER_MANIFEST_V1 | DOCKER_MANIFEST_V1_SIGNED => Ok(Document::V1(json(content)?)),
            DOCKER_MANIFEST_LIST | OCI_INDEX => Ok(Document::Index(json(content)?)),
            _ => Ok(Document::Image(json(content)?)),
        }
    }

    fn references(&self) -> Result<Vec<Digest>, RegistryError> {
        let raw: Vec<String> = match self {
            Document::V1(document) => document.fs_layers.iter().map(|layer| layer.blob_sum.clone()).collect(),
            Document::Image(image) => iter::once(image.config())
                .chain(image.layers())
                .map(descriptor_digest)
                .collect(),
            Document::Index(index) => index.manifests().iter().map(descriptor_digest).collect(),
        };

        let mut references = raw.iter()
            .map(|digest| Digest::parse(digest).map_err(|e| invalid("manifest references an invalid digest").with_error(e.to_string())))
            .collect::<Result<Vec<Digest>, RegistryError>>()?;

        references.sort();
        references.dedup();
        Ok(references)
    }
}

/// A blob interpreted as registry metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    digest: Digest,
    media_type: String,
    content: Bytes,
}

impl Manifest {

    /// Validate the content as a manifest of a supported media type.
    /// The type declared inside the document wins over the one declared by the client,
    /// the shape of the document decides when neither is usable.
    pub fn parse(digest: Digest, content: Bytes, declared: Option<&str>) -> Result<Manifest, RegistryError> {
        let envelope: Envelope = json(&content)?;

        let own = match envelope.media_type.as_deref() {
            Some(mime) if SUPPORTED_MEDIA_TYPES.contains(&mime) => Some(mime),
            Some(mime) => return Err(invalid("unsupported manifest media type").with_error(mime)),
            None => None,
        };
        let declared = declared
            .map(essence)
            .filter(|mime| SUPPORTED_MEDIA_TYPES.contains(mime));

        let (media_type, document) = match envelope.schema_version {
            1 => {
                let document: SchemaV1 = json(&content)?;
                let media_type = match own.or(declared) {
                    Some(mime) if is_schema_v1(mime) => mime,
                    Some(mime) => return Err(invalid("schema 1 manifest declared as a schema 2 type").with_error(mime)),
                    None if document.signatures.is_some() => DOCKER_MANIFEST_V1_SIGNED,
                    None => DOCKER_MANIFEST_V1,
                };
                (media_type.to_string(), Document::V1(document))
            }
            2 => {
                if let Some(mime) = own.filter(|mime| is_schema_v1(mime)) {
                    return Err(invalid("schema 2 manifest declared as a schema 1 type").with_error(mime));
                }

                match own.or(declared.filter(|mime| !is_schema_v1(mime))) {
                    Some(mime) => (mime.to_string(), Document::read(mime, &content)?),
                    None if envelope.manifests.is_some() => {
                        let index: ImageIndex = json(&content)?;
                        (index_media_type(&index).to_string(), Document::Index(index))
                    }
                    None => {
                        let image: ImageManifest = json(&content)?;
                        (image_media_type(&image).to_string(), Document::Image(image))
                    }
                }
            }
            version => return Err(invalid("unsupported manifest schema version").with_error(version.to_string())),
        };

        // every reference must be addressable here
        document.references()?;

        Ok(Manifest {
            digest,
            media_type,
            content,
        })
    }

    /// Rebuild a manifest already validated when it was stored
    pub fn stored(digest: Digest, media_type: String, content: Bytes) -> Manifest {
        Manifest {
            digest,
            media_type,
            content,
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// The native media type of the manifest
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Every media type the manifest can be served as, native first
    pub fn media_types(&self) -> Vec<&str> {
        match self.media_type.as_str() {
            DOCKER_MANIFEST_V1_SIGNED => vec![DOCKER_MANIFEST_V1_SIGNED, DOCKER_MANIFEST_V1],
            DOCKER_MANIFEST_V1 => vec![DOCKER_MANIFEST_V1, DOCKER_MANIFEST_V1_SIGNED],
            native => vec![native],
        }
    }

    /// Digests of the config, layers and child manifests referenced by this manifest
    pub fn references(&self) -> Result<Vec<Digest>, RegistryError> {
        Document::read(&self.media_type, &self.content)?.references()
    }

    /// Pick the media type to answer with from the request `Accept` ranges,
    /// by q value then specificity. The native type is the fallback.
    pub fn negotiate(&self, accept: &Accept) -> &str {
        let supported = self.media_types();

        // q=0 means not acceptable
        let acceptable = Accept(accept.0.iter()
            .filter(|range| range.quality != Quality::ZERO)
            .cloned()
            .collect());

        for range in acceptable.ranked() {
            let mime = range.essence_str();
            if mime == "*/*" || mime == "application/*" {
                return self.media_type();
            }
            if let Some(found) = supported.iter().find(|candidate| **candidate == mime) {
                return *found;
            }
        }

        self.media_type()
    }
}

fn json<T: DeserializeOwned>(content: &[u8]) -> Result<T, RegistryError> {
    serde_json::from_slice::<T>(content)
        .map_err(|e| invalid("manifest is not a valid manifest document").with_error(e.to_string()))
}

fn invalid(context: &str) -> RegistryError {
    RegistryError::new(ErrorKind::RegistryManifestInvalid).with_context(context)
}

fn descriptor_digest(descriptor: &Descriptor) -> String {
    descriptor.digest().to_string()
}

fn is_schema_v1(mime: &str) -> bool {
    mime == DOCKER_MANIFEST_V1 || mime == DOCKER_MANIFEST_V1_SIGNED
}

/// Strip the parameters, e.g. `; charset=utf-8`, from a media type
fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or_default().trim()
}

fn index_media_type(index: &ImageIndex) -> &'static str {
    let oci_children = index.manifests().iter()
        .any(|child| *child.media_type() == MediaType::ImageManifest);

    if oci_children { OCI_INDEX } else { DOCKER_MANIFEST_LIST }
}

fn image_media_type(image: &ImageManifest) -> &'static str {
    if image.config().media_type().to_string().starts_with("application/vnd.oci") {
        OCI_MANIFEST
    } else {
        DOCKER_MANIFEST_V2
    }
}

#[cfg(test)]
pub(crate) mod test {
    use actix_web::http::header::{self, Accept, Header};
    use actix_web::test::TestRequest;
    use bytes::Bytes;
    use serde_json::json;
    use crate::error::error_kind::ErrorKind;
    use crate::error::registry::RegistryError;
    use crate::registry::digest::Digest;
    use super::{Manifest, DOCKER_MANIFEST_LIST, DOCKER_MANIFEST_V1, DOCKER_MANIFEST_V1_SIGNED, DOCKER_MANIFEST_V2, OCI_INDEX, OCI_MANIFEST};

    pub(crate) const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
    pub(crate) const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
    pub(crate) const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

    pub(crate) fn descriptor(media_type: &str, digest: &Digest) -> serde_json::Value {
        json!({"mediaType": media_type, "digest": digest.to_string(), "size": 1})
    }

    /// A schema 2 image manifest: the media type of the config tells docker from oci
    pub(crate) fn image(media_type: &str, config: &Digest, layers: &[Digest]) -> Bytes {
        let config_type = if media_type == OCI_MANIFEST { OCI_CONFIG } else { DOCKER_CONFIG };
        let document = json!({
            "schemaVersion": 2,
            "mediaType": media_type,
            "config": descriptor(config_type, config),
            "layers": layers.iter().map(|layer| descriptor(DOCKER_LAYER, layer)).collect::<Vec<_>>(),
        });
        Bytes::from(serde_json::to_vec(&document).expect("json"))
    }

    fn manifest(document: serde_json::Value, declared: Option<&str>) -> Result<Manifest, RegistryError> {
        let content = Bytes::from(serde_json::to_vec(&document).expect("json"));
        let digest = Digest::compute(&content);
        Manifest::parse(digest, content, declared)
    }

    fn accept(values: &[&str]) -> Accept {
        let request = values.iter()
            .fold(TestRequest::default(), |request, value| request.append_header((header::ACCEPT, *value)))
            .to_http_request();
        Accept::parse(&request).expect("accept header")
    }

    fn config() -> Digest {
        Digest::compute(b"config")
    }

    fn layer() -> Digest {
        Digest::compute(b"layer")
    }

    #[test]
    fn media_type_from_document_test() {
        let content = image(DOCKER_MANIFEST_V2, &config(), &[layer()]);
        let parsed = Manifest::parse(Digest::compute(&content), content, Some(OCI_MANIFEST)).expect("valid manifest");

        assert_eq!(DOCKER_MANIFEST_V2, parsed.media_type());
    }

    #[test]
    fn media_type_from_content_type_test() {
        let parsed = manifest(json!({
            "schemaVersion": 2,
            "config": descriptor(OCI_CONFIG, &config()),
            "layers": []
        }), Some("application/vnd.oci.image.manifest.v1+json; charset=utf-8")).expect("valid manifest");
        assert_eq!(OCI_MANIFEST, parsed.media_type());
    }

    #[test]
    fn media_type_detection_test() {
        let parsed = manifest(json!({
            "schemaVersion": 2,
            "config": descriptor(DOCKER_CONFIG, &config()),
            "layers": [descriptor(DOCKER_LAYER, &layer())]
        }), None).expect("valid manifest");
        assert_eq!(DOCKER_MANIFEST_V2, parsed.media_type());

        let parsed = manifest(json!({
            "schemaVersion": 2,
            "config": descriptor(OCI_CONFIG, &config()),
            "layers": []
        }), None).expect("valid manifest");
        assert_eq!(OCI_MANIFEST, parsed.media_type());

        let parsed = manifest(json!({
            "schemaVersion": 2,
            "manifests": [descriptor(DOCKER_MANIFEST_V2, &layer())]
        }), Some("application/json")).expect("valid list");
        assert_eq!(DOCKER_MANIFEST_LIST, parsed.media_type());

        let parsed = manifest(json!({
            "schemaVersion": 2,
            "manifests": [descriptor(OCI_MANIFEST, &layer())]
        }), None).expect("valid index");
        assert_eq!(OCI_INDEX, parsed.media_type());

        let parsed = manifest(json!({
            "schemaVersion": 1,
            "fsLayers": [{"blobSum": layer().to_string()}],
            "signatures": []
        }), None).expect("valid schema1");
        assert_eq!(DOCKER_MANIFEST_V1_SIGNED, parsed.media_type());
    }

    #[test]
    fn invalid_manifest_test() {
        let content = Bytes::from_static(b"not json at all");
        let err = Manifest::parse(Digest::compute(&content), content, None).expect_err("garbage is not a manifest");
        assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);

        // any json object is not a manifest
        for document in [json!({}), json!({"foo": 1}), json!({"schemaVersion": 3, "layers": []})] {
            let err = manifest(document, None).expect_err("not a manifest");
            assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);
        }

        let err = manifest(json!({"schemaVersion": 2, "mediaType": "application/x-tar"}), None).expect_err("unsupported type");
        assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);

        // an image manifest needs its config, an index its manifests
        let err = manifest(json!({"schemaVersion": 2, "mediaType": DOCKER_MANIFEST_V2, "layers": []}), None).expect_err("no config");
        assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);
        let err = manifest(json!({"schemaVersion": 2, "mediaType": OCI_INDEX}), None).expect_err("no manifests");
        assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);

        let err = manifest(json!({"schemaVersion": 1, "mediaType": OCI_MANIFEST, "fsLayers": []}), None).expect_err("schema mismatch");
        assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);

        let err = manifest(json!({
            "schemaVersion": 1,
            "fsLayers": [{"blobSum": "sha256:nope"}]
        }), None).expect_err("bad layer digest");
        assert_eq!(ErrorKind::RegistryManifestInvalid, err.kind);
    }

    #[test]
    fn references_test() {
        let content = image(DOCKER_MANIFEST_V2, &config(), &[layer(), layer()]);
        let parsed = Manifest::parse(Digest::compute(&content), content, None).expect("valid manifest");

        let references = parsed.references().expect("references");
        assert_eq!(2, references.len());
        assert!(references.contains(&config()));
        assert!(references.contains(&layer()));
    }

    #[test]
    fn negotiate_test() {
        let parsed = manifest(json!({"schemaVersion": 1, "fsLayers": []}), None).expect("valid schema1");
        assert_eq!(DOCKER_MANIFEST_V1, parsed.media_type());

        // no accept header: native type
        assert_eq!(DOCKER_MANIFEST_V1, parsed.negotiate(&Accept(Vec::new())));

        // no intersection: native type
        assert_eq!(DOCKER_MANIFEST_V1, parsed.negotiate(&accept(&[OCI_MANIFEST])));

        // highest q wins among the supported representations
        let ranked = format!("{};q=0.5, {};q=0.9", DOCKER_MANIFEST_V1, DOCKER_MANIFEST_V1_SIGNED);
        assert_eq!(DOCKER_MANIFEST_V1_SIGNED, parsed.negotiate(&accept(&[ranked.as_str()])));

        // multiple header values are merged
        assert_eq!(DOCKER_MANIFEST_V1_SIGNED, parsed.negotiate(&accept(&[OCI_MANIFEST, DOCKER_MANIFEST_V1_SIGNED])));

        // q=0 means not acceptable
        let refused = format!("{};q=0", DOCKER_MANIFEST_V1_SIGNED);
        assert_eq!(DOCKER_MANIFEST_V1, parsed.negotiate(&accept(&[refused.as_str()])));
    }
}
