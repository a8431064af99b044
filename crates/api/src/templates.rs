use handlebars::{Handlebars, RenderError};
use services::auth::SigninPage;

const SIGNIN_TEMPLATE: &str = "signin";

/// Renders the sign-in page. Values are HTML-escaped by Handlebars.
pub struct SigninRenderer {
    handlebars: Handlebars<'static>,
}

impl SigninRenderer {
    pub fn new() -> anyhow::Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars
            .register_template_string(SIGNIN_TEMPLATE, include_str!("../templates/signin.hbs"))
            .map_err(|e| anyhow::anyhow!("Failed to register sign-in template: {e}"))?;

        Ok(Self { handlebars })
    }

    pub fn render(&self, page: &SigninPage) -> Result<String, RenderError> {
        self.handlebars.render(SIGNIN_TEMPLATE, page)
    }
}
