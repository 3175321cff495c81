// SPDX-License-Identifier: Apache-2.0
use uuid::Uuid;
use crate::registry::digest::Digest;

/// Root of everything the registry writes in the storage driver
const ROOT: &str = "docker/registry/v2";

/// Final location of a blob, fanned out by the first two characters of the hash
pub fn blob_data(digest: &Digest) -> String {
    format!("{}/blobs/{}/{}/{}/data", ROOT, digest.algo, digest.shard(), digest.hash)
}

/// Staging location of content while it is being written and hashed
pub fn upload_data(id: &Uuid) -> String {
    format!("{}/_uploads/{}/data", ROOT, id)
}

/// Marker of an upload session started by the client
pub fn upload_started(id: &Uuid) -> String {
    format!("{}/{}/{}", uploads(), id, UPLOAD_STARTED)
}

/// File name of the session markers
pub const UPLOAD_STARTED: &str = "startedat";

/// Parent of every upload session and staging file
pub fn uploads() -> String {
    format!("{}/_uploads", ROOT)
}

#[cfg(test)]
mod test {
    use uuid::Uuid;
    use crate::registry::digest::Digest;

    #[test]
    fn blob_path_test() {
        let digest = Digest::parse("sha256:054edec1d0211f624fed0cbca9d4f9400b0e491c43742af2c5b0abebf0c990d8").unwrap();
        assert_eq!(
            "docker/registry/v2/blobs/sha256/05/054edec1d0211f624fed0cbca9d4f9400b0e491c43742af2c5b0abebf0c990d8/data",
            super::blob_data(&digest)
        );
    }

    #[test]
    fn upload_path_test() {
        let id = Uuid::nil();
        assert_eq!("docker/registry/v2/_uploads/00000000-0000-0000-0000-000000000000/data", super::upload_data(&id));
        assert_eq!("docker/registry/v2/_uploads/00000000-0000-0000-0000-000000000000/startedat", super::upload_started(&id));
    }
}
