//! Enrichment of packages from `artifacthub.io/*` chart annotations.
//!
//! [`enrich`] runs a fixed sequence of steps, each taking the package by
//! value and returning the updated package. Links, maintainers, the
//! operator flag and the prerelease flag fail the whole pipeline when
//! malformed; every other key is applied only when it parses.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    error::AnnotationError,
    types::{ContainerImage, Link, Maintainer, Package},
};

pub const CHANGES_ANNOTATION: &str = "artifacthub.io/changes";
pub const CRDS_ANNOTATION: &str = "artifacthub.io/crds";
pub const CRDS_EXAMPLES_ANNOTATION: &str = "artifacthub.io/crdsExamples";
pub const IMAGES_ANNOTATION: &str = "artifacthub.io/images";
pub const LICENSE_ANNOTATION: &str = "artifacthub.io/license";
pub const LINKS_ANNOTATION: &str = "artifacthub.io/links";
pub const MAINTAINERS_ANNOTATION: &str = "artifacthub.io/maintainers";
pub const OPERATOR_ANNOTATION: &str = "artifacthub.io/operator";
pub const OPERATOR_CAPABILITIES_ANNOTATION: &str = "artifacthub.io/operatorCapabilities";
pub const PRERELEASE_ANNOTATION: &str = "artifacthub.io/prerelease";
pub const SECURITY_UPDATES_ANNOTATION: &str = "artifacthub.io/containsSecurityUpdates";

pub type Annotations = BTreeMap<String, String>;

type Step = fn(Package, &Annotations) -> Result<Package, AnnotationError>;

const STEPS: [Step; 11] = [
    changes,
    crds,
    crds_examples,
    images,
    license,
    links,
    maintainers,
    operator,
    operator_capabilities,
    prerelease,
    security_updates,
];

/// Applies every recognized annotation to `package`.
///
/// Steps run in a fixed order; the first hard failure is returned and the
/// remaining steps are not applied.
pub fn enrich(package: Package, annotations: &Annotations) -> Result<Package, AnnotationError> {
    STEPS
        .iter()
        .try_fold(package, |package, step| step(package, annotations))
}

/// Parses booleans with the spellings accepted by Go's `strconv.ParseBool`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// An empty document parses as an empty list.
fn parse_list<T: DeserializeOwned>(value: &str) -> Result<Vec<T>, serde_yaml::Error> {
    serde_yaml::from_str::<Option<Vec<T>>>(value).map(Option::unwrap_or_default)
}

fn changes(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(CHANGES_ANNOTATION) {
        match parse_list(v) {
            Ok(changes) => p.changes = changes,
            Err(err) => debug!(key = CHANGES_ANNOTATION, %err, "ignoring annotation"),
        }
    }
    Ok(p)
}

fn crds(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(CRDS_ANNOTATION) {
        match parse_list(v) {
            Ok(crds) => p.crds = crds,
            Err(err) => debug!(key = CRDS_ANNOTATION, %err, "ignoring annotation"),
        }
    }
    Ok(p)
}

fn crds_examples(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(CRDS_EXAMPLES_ANNOTATION) {
        match parse_list(v) {
            Ok(examples) => p.crds_examples = examples,
            Err(err) => {
                warn!(
                    package = %p.name,
                    version = %p.version,
                    key = CRDS_EXAMPLES_ANNOTATION,
                    %err,
                    "ignoring annotation"
                )
            }
        }
    }
    Ok(p)
}

fn images(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(IMAGES_ANNOTATION) {
        match parse_list::<ContainerImage>(v) {
            Ok(images) => p.containers_images = images,
            Err(err) => debug!(key = IMAGES_ANNOTATION, %err, "ignoring annotation"),
        }
    }
    Ok(p)
}

fn license(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(LICENSE_ANNOTATION).filter(|v| !v.is_empty()) {
        p.license = v.clone();
    }
    Ok(p)
}

fn links(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    let Some(v) = a.get(LINKS_ANNOTATION) else {
        return Ok(p);
    };
    let links: Vec<Link> = parse_list(v).map_err(|_| AnnotationError::InvalidLinks(v.clone()))?;

    for link in links {
        match p.links.iter_mut().find(|existing| existing.url == link.url) {
            Some(existing) => existing.name = link.name,
            None => p.links.push(link),
        }
    }
    Ok(p)
}

fn maintainers(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    let Some(v) = a.get(MAINTAINERS_ANNOTATION) else {
        return Ok(p);
    };
    let maintainers: Vec<Maintainer> =
        parse_list(v).map_err(|_| AnnotationError::InvalidMaintainers(v.clone()))?;

    for maintainer in maintainers {
        match p
            .maintainers
            .iter_mut()
            .find(|existing| existing.email == maintainer.email)
        {
            Some(existing) => existing.name = maintainer.name,
            None => p.maintainers.push(maintainer),
        }
    }
    Ok(p)
}

fn operator(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(OPERATOR_ANNOTATION) {
        p.is_operator = parse_bool(v).ok_or(AnnotationError::InvalidOperator)?;
    }
    Ok(p)
}

fn operator_capabilities(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    p.capabilities = a
        .get(OPERATOR_CAPABILITIES_ANNOTATION)
        .cloned()
        .unwrap_or_default();
    Ok(p)
}

fn prerelease(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(v) = a.get(PRERELEASE_ANNOTATION) {
        p.prerelease = parse_bool(v).ok_or(AnnotationError::InvalidPrerelease)?;
    }
    Ok(p)
}

fn security_updates(mut p: Package, a: &Annotations) -> Result<Package, AnnotationError> {
    if let Some(value) = a
        .get(SECURITY_UPDATES_ANNOTATION)
        .and_then(|v| parse_bool(v))
    {
        p.contains_security_updates = value;
    }
    Ok(p)
}
