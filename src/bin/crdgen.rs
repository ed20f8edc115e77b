//! Prints the S3Bucket CustomResourceDefinition as YAML.
//!
//! ```bash
//! crdgen | kubectl apply -f -
//! ```

use kube::CustomResourceExt;
use s3bucket_operator::S3Bucket;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&S3Bucket::crd())?);
    Ok(())
}
