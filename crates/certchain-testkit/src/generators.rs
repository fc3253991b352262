//! Proptest generators for property-based testing.

use proptest::prelude::*;

use certchain::{CertificationRequest, ComplianceChecks};
use certchain_core::{ContentType, Digest};

/// Generate a random Digest.
pub fn digest() -> impl Strategy<Value = Digest> {
    any::<[u8; 32]>().prop_map(Digest)
}

/// Generate between 1 and `max` distinct-looking leaves.
pub fn leaves(max: usize) -> impl Strategy<Value = Vec<Digest>> {
    prop::collection::vec(digest(), 1..=max.max(1))
}

/// Generate a ContentType.
pub fn content_type() -> impl Strategy<Value = ContentType> {
    prop_oneof![
        Just(ContentType::Image),
        Just(ContentType::Video),
        Just(ContentType::Audio),
        Just(ContentType::Text),
        Just(ContentType::Document),
        Just(ContentType::Product),
    ]
}

/// Generate content bytes of specified max length.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for generating a certification request.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub content: Vec<u8>,
    pub content_type: ContentType,
    pub model_id: Option<String>,
    pub prompt: Option<String>,
    pub operator_id: Option<String>,
    pub product_id: Option<String>,
    pub compliance: ComplianceChecks,
}

impl Arbitrary for RequestParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            content(512),
            content_type(),
            proptest::option::of("[a-z][a-z0-9-]{0,15}"),
            proptest::option::of(".{0,64}"),
            proptest::option::of("[a-z]{1,12}"),
            proptest::option::of("sku-[0-9]{1,6}"),
            (any::<bool>(), any::<bool>()),
        )
            .prop_map(
                |(content, content_type, model_id, prompt, operator_id, product_id, (ecgt, pii))| {
                    RequestParams {
                        content,
                        content_type,
                        model_id,
                        prompt,
                        operator_id,
                        product_id,
                        compliance: ComplianceChecks {
                            ecgt,
                            brand: false,
                            pii,
                        },
                    }
                },
            )
            .boxed()
    }
}

impl RequestParams {
    pub fn to_request(&self) -> CertificationRequest {
        let mut request = CertificationRequest::new(self.content.clone(), self.content_type)
            .compliance(self.compliance);
        if let Some(model) = &self.model_id {
            request = request.model(model.clone());
        }
        if let Some(prompt) = &self.prompt {
            request = request.prompt(prompt.clone());
        }
        if let Some(operator) = &self.operator_id {
            request = request.operator(operator.clone());
        }
        if let Some(product) = &self.product_id {
            request = request.product(product.clone());
        }
        request
    }
}
