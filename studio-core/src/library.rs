//! Built-in component libraries.
//!
//! The base library renders structural host elements with their props as
//! attributes. It carries no styling. The navigation library overrides
//! `Link` so page links are marked for client-side navigation.

use crate::image::ImageSource;
use crate::props::{self, ResolvedProp, ResolvedProps};
use crate::registry::{
    Component, ComponentKind, ComponentMeta, ComponentRegistration, PropKind, PropMeta, PropsMeta,
    RenderInput, Rendered,
};
use crate::value::Value;

/// Copy plain-value props onto the element, skipping `skip`.
fn with_attributes(mut rendered: Rendered, props: &ResolvedProps, skip: &[&str]) -> Rendered {
    for (name, prop) in props {
        if skip.contains(&name.as_str()) {
            continue;
        }
        if let ResolvedProp::Value(value) = prop {
            if !value.is_undefined() {
                rendered.attributes.insert(name.clone(), value.clone());
            }
        }
    }
    rendered
}

fn tag_prop<'a>(props: &'a ResolvedProps, default: &'a str) -> &'a str {
    props
        .get("tag")
        .and_then(ResolvedProp::as_value)
        .and_then(Value::as_str)
        .unwrap_or(default)
}

/// Element with a fixed tag, overridable through a `tag` prop.
struct Element {
    tag: &'static str,
}

impl Component for Element {
    fn render(&self, input: &RenderInput<'_>) -> Rendered {
        let tag = tag_prop(input.props, self.tag);
        with_attributes(Rendered::new(tag), input.props, &["tag"])
    }
}

/// `<a>` with its `href` resolved from pages, assets or plain strings.
struct Link {
    client_navigation: bool,
}

impl Component for Link {
    fn render(&self, input: &RenderInput<'_>) -> Rendered {
        let href_prop = input.props.get("href");
        let href = props::href(href_prop, input.params);
        let mut rendered = with_attributes(Rendered::new("a"), input.props, &["href"]).attr("href", href);
        if self.client_navigation && matches!(href_prop, Some(ResolvedProp::Page { .. })) {
            rendered = rendered.attr("data-client-navigation", true);
        }
        rendered
    }
}

/// `<img>` whose `src` comes from an asset or a plain URL.
struct Image;

impl Component for Image {
    fn render(&self, input: &RenderInput<'_>) -> Rendered {
        let path = match input.props.get("src").and_then(ResolvedProp::as_value) {
            Some(Value::Asset(asset)) => asset.url.clone(),
            Some(Value::String(url)) if !url.is_empty() => Some(url.clone()),
            _ => None,
        };
        let source = ImageSource::settled(path);
        with_attributes(Rendered::new("img"), input.props, &["src"]).attr("src", source.src())
    }
}

fn container(label: &str) -> ComponentMeta {
    ComponentMeta {
        label: Some(label.to_string()),
        ..ComponentMeta::new(ComponentKind::Container)
    }
}

fn rich_text(label: &str) -> ComponentMeta {
    ComponentMeta {
        label: Some(label.to_string()),
        ..ComponentMeta::new(ComponentKind::RichText)
    }
}

fn tag_props(default: &str) -> PropsMeta {
    PropsMeta::default().prop(
        "tag",
        PropMeta {
            kind: PropKind::String,
            required: false,
            default: Some(Value::from(default)),
        },
    )
}

fn link_props() -> PropsMeta {
    PropsMeta {
        initial_props: vec!["href".to_string(), "target".to_string()],
        ..PropsMeta::default()
    }
    .prop("href", PropMeta::optional(PropKind::Url))
    .prop("target", PropMeta::optional(PropKind::String))
}

/// Structural components in the default namespace: `Body`, `Box`, `Text`,
/// `Heading`, `Paragraph`, `Link` and `Image`.
#[must_use]
pub fn base_library() -> ComponentRegistration {
    ComponentRegistration::new()
        .component(
            "Body",
            Element { tag: "body" },
            container("Body"),
            PropsMeta::default(),
        )
        .component("Box", Element { tag: "div" }, container("Box"), tag_props("div"))
        .component("Text", Element { tag: "div" }, rich_text("Text"), PropsMeta::default())
        .component("Heading", Element { tag: "h1" }, rich_text("Heading"), tag_props("h1"))
        .component(
            "Paragraph",
            Element { tag: "p" },
            rich_text("Paragraph"),
            PropsMeta::default(),
        )
        .component(
            "Link",
            Link {
                client_navigation: false,
            },
            rich_text("Link"),
            link_props(),
        )
        .component(
            "Image",
            Image,
            ComponentMeta {
                label: Some("Image".to_string()),
                ..ComponentMeta::new(ComponentKind::Embed)
            },
            PropsMeta {
                initial_props: vec!["src".to_string(), "alt".to_string()],
                ..PropsMeta::default()
            }
            .prop(
                "src",
                PropMeta {
                    kind: PropKind::Asset,
                    required: true,
                    default: None,
                },
            )
            .prop("alt", PropMeta::optional(PropKind::String)),
        )
}

/// Overrides `Link` in the default namespace with a client-side navigating
/// link. Register after [`base_library`].
#[must_use]
pub fn navigation_library() -> ComponentRegistration {
    ComponentRegistration::new().renderer(
        "Link",
        Link {
            client_navigation: true,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;
    use crate::page::Params;
    use crate::registry::ComponentRegistry;
    use crate::image::BROKEN_IMAGE_PLACEHOLDER;
    use crate::tree::RenderMode;
    use crate::value::AssetRef;

    fn render(registry: &ComponentRegistry, component: &str, props: &ResolvedProps, mode: RenderMode) -> Rendered {
        let entry = registry.resolve_qualified(component).expect("registered");
        let instance = Instance::new("i", component);
        entry.component.render(&RenderInput {
            instance: &instance,
            props,
            params: &Params::new("/img/", "/assets/"),
            mode,
        })
    }

    fn base() -> ComponentRegistry {
        let registry = ComponentRegistry::new();
        registry.register(base_library());
        registry
    }

    #[test]
    fn test_box_tag_override() {
        let registry = base();
        let mut props = ResolvedProps::new();
        props.insert("tag".to_string(), ResolvedProp::Value(Value::from("section")));
        props.insert("id".to_string(), ResolvedProp::Value(Value::from("main")));
        props.insert("hidden".to_string(), ResolvedProp::Value(Value::Undefined));
        let rendered = render(&registry, "Box", &props, RenderMode::Preview);
        assert_eq!(rendered.tag, "section");
        assert_eq!(rendered.attributes.get("id"), Some(&Value::from("main")));
        assert!(!rendered.attributes.contains_key("tag"));
        assert!(!rendered.attributes.contains_key("hidden"));
    }

    #[test]
    fn test_link_unset_href() {
        let registry = base();
        let rendered = render(&registry, "Link", &ResolvedProps::new(), RenderMode::Preview);
        assert_eq!(rendered.attributes.get("href"), Some(&Value::from("#")));
    }

    #[test]
    fn test_navigation_link_overrides_base() {
        let registry = base();
        registry.register(navigation_library());
        let mut props = ResolvedProps::new();
        props.insert(
            "href".to_string(),
            ResolvedProp::Page {
                path: "/about".to_string(),
                hash: None,
            },
        );
        let rendered = render(&registry, "Link", &props, RenderMode::Preview);
        assert_eq!(rendered.attributes.get("href"), Some(&Value::from("/about")));
        assert_eq!(
            rendered.attributes.get("data-client-navigation"),
            Some(&Value::Bool(true))
        );
        // Metadata from the base library is kept.
        let entry = registry.resolve(None, "Link").expect("link");
        assert_eq!(entry.props_meta.initial_props, vec!["href", "target"]);
    }

    #[test]
    fn test_image_src() {
        let registry = base();
        let mut props = ResolvedProps::new();
        props.insert(
            "src".to_string(),
            ResolvedProp::Value(Value::Asset(
                AssetRef::new("hero", "hero.png").with_url("/img/hero.png"),
            )),
        );
        let rendered = render(&registry, "Image", &props, RenderMode::Preview);
        assert_eq!(rendered.attributes.get("src"), Some(&Value::from("/img/hero.png")));

        for mode in [RenderMode::Design, RenderMode::Preview] {
            let missing = render(&registry, "Image", &ResolvedProps::new(), mode);
            assert_eq!(
                missing.attributes.get("src"),
                Some(&Value::from(BROKEN_IMAGE_PLACEHOLDER))
            );
        }
    }
}
