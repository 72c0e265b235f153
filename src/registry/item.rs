//! Configuration items backed by up to two authoritative sources.
//!
//! A [`DualAuthorityItem`] is built from an [`ItemDescriptor`] naming any of:
//! - an explicit get/set pair
//! - an object binding: a property on a [`Reflect`] target, or a
//!   getter/setter method pair on it
//! - a menu checkbox addressed as `"Group > Item"` on a [`MenuApi`]
//!
//! Each binding is resolved once into an [`Accessor`]. Reads go to the
//! primary authority (explicit > object > menu); writes go to every binding.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::value::{same_value, truthy};
use crate::{Error, Result};

/// Shared, single-threaded handle to a host object.
pub type Shared<T> = Rc<RefCell<T>>;

/// Host object exposing named properties and/or getter/setter methods.
pub trait Reflect {
    fn has_property(&self, name: &str) -> bool;

    fn get_property(&self, name: &str) -> Option<Value>;

    /// Returns false if the property does not exist.
    fn set_property(&mut self, name: &str, value: Value) -> bool;

    fn has_method(&self, _name: &str) -> bool {
        false
    }

    fn call_getter(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Returns false if the method does not exist.
    fn call_setter(&mut self, _name: &str, _value: Value) -> bool {
        false
    }
}

/// Host menu system with checkable options.
pub trait MenuApi {
    fn menu_item_exists(&self, menu: &str, item: &str) -> bool;

    fn is_option_checked(&self, item: &str) -> bool;

    fn set_is_option_checked(&mut self, item: &str, checked: bool);
}

/// Getter half of an explicit binding.
pub type GetFn = Box<dyn Fn() -> Value>;
/// Setter half of an explicit binding.
pub type SetFn = Box<dyn Fn(Value)>;

/// Object binding: `[target, getter_or_property, setter?]`.
pub struct ObjectBinding {
    target: Shared<dyn Reflect>,
    getter: String,
    setter: Option<String>,
}

/// Declarative description of one configuration item.
#[derive(Default)]
pub struct ItemDescriptor {
    item: Option<(GetFn, SetFn)>,
    object: Option<ObjectBinding>,
    menu: Option<(Shared<dyn MenuApi>, String)>,
}

impl ItemDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind explicit get/set closures.
    pub fn accessor(
        mut self,
        get: impl Fn() -> Value + 'static,
        set: impl Fn(Value) + 'static,
    ) -> Self {
        self.item = Some((Box::new(get), Box::new(set)));
        self
    }

    /// Bind a plain property on `target`.
    pub fn property(mut self, target: Shared<dyn Reflect>, name: impl Into<String>) -> Self {
        self.object = Some(ObjectBinding {
            target,
            getter: name.into(),
            setter: None,
        });
        self
    }

    /// Bind a getter/setter method pair on `target`.
    pub fn methods(
        mut self,
        target: Shared<dyn Reflect>,
        getter: impl Into<String>,
        setter: impl Into<String>,
    ) -> Self {
        self.object = Some(ObjectBinding {
            target,
            getter: getter.into(),
            setter: Some(setter.into()),
        });
        self
    }

    /// Bind a menu checkbox, e.g. `"Avatar > Enable Avatar Collisions"`.
    pub fn menu(mut self, menu: Shared<dyn MenuApi>, path: impl Into<String>) -> Self {
        self.menu = Some((menu, path.into()));
        self
    }
}

/// Which binding `get()` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Item,
    Object,
    Menu,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authority::Item => write!(f, "item"),
            Authority::Object => write!(f, "object"),
            Authority::Menu => write!(f, "menu"),
        }
    }
}

/// A resolved read/write path to one external value.
pub enum Accessor {
    Explicit {
        get: GetFn,
        set: SetFn,
    },
    Property {
        target: Shared<dyn Reflect>,
        name: String,
    },
    GetterSetter {
        target: Shared<dyn Reflect>,
        getter: String,
        setter: String,
    },
    Menu {
        menu: Shared<dyn MenuApi>,
        item: String,
    },
}

impl Accessor {
    pub fn get(&self) -> Value {
        match self {
            Accessor::Explicit { get, .. } => get(),
            Accessor::Property { target, name } => {
                target.borrow().get_property(name).unwrap_or(Value::Null)
            }
            Accessor::GetterSetter { target, getter, .. } => {
                target.borrow().call_getter(getter).unwrap_or(Value::Null)
            }
            Accessor::Menu { menu, item } => Value::Bool(menu.borrow().is_option_checked(item)),
        }
    }

    pub fn set(&self, value: Value) {
        match self {
            Accessor::Explicit { set, .. } => set(value),
            Accessor::Property { target, name } => {
                if !target.borrow_mut().set_property(name, value) {
                    warn!("property '{}' vanished from its target", name);
                }
            }
            Accessor::GetterSetter { target, setter, .. } => {
                if !target.borrow_mut().call_setter(setter, value) {
                    warn!("setter '{}' vanished from its target", setter);
                }
            }
            Accessor::Menu { menu, item } => {
                menu.borrow_mut().set_is_option_checked(item, truthy(&value))
            }
        }
    }

    /// Whether this accessor's current value already matches `value`.
    ///
    /// Menus only hold booleans, so they compare against the truthiness of
    /// `value`.
    fn matches(&self, value: &Value) -> bool {
        match self {
            Accessor::Menu { .. } => self.get() == Value::Bool(truthy(value)),
            _ => same_value(&self.get(), value),
        }
    }
}

fn resolve_object(binding: ObjectBinding) -> std::result::Result<Accessor, String> {
    let ObjectBinding {
        target,
        getter,
        setter,
    } = binding;
    let valid = {
        let object = target.borrow();
        match setter {
            Some(ref setter) => {
                if !object.has_method(&getter) {
                    Err(format!("getter method '{}' not found", getter))
                } else if !object.has_method(setter) {
                    Err(format!("setter method '{}' not found", setter))
                } else {
                    Ok(())
                }
            }
            None if object.has_property(&getter) => Ok(()),
            None => Err(format!("property '{}' not found", getter)),
        }
    };
    valid?;

    Ok(match setter {
        Some(setter) => Accessor::GetterSetter {
            target,
            getter,
            setter,
        },
        None => Accessor::Property {
            target,
            name: getter,
        },
    })
}

fn resolve_menu(menu: Shared<dyn MenuApi>, path: &str) -> std::result::Result<Accessor, String> {
    let (group, item) = path
        .rsplit_once('>')
        .map(|(group, item)| (group.trim(), item.trim()))
        .ok_or_else(|| format!("menu path '{}' is not of the form 'Group > Item'", path))?;

    if !menu.borrow().menu_item_exists(group, item) {
        return Err(format!("menu item '{}' not found", path));
    }
    Ok(Accessor::Menu {
        menu,
        item: item.to_string(),
    })
}

/// One configuration item with reconciled backing sources.
pub struct DualAuthorityItem {
    setting_name: String,
    authority: Authority,
    item: Option<Accessor>,
    object: Option<Accessor>,
    menu: Option<Accessor>,
}

impl DualAuthorityItem {
    /// Resolve every binding in `descriptor`.
    ///
    /// Invalid bindings are skipped with a warning; it is an error if none
    /// resolve.
    pub fn new(setting_name: impl Into<String>, descriptor: ItemDescriptor) -> Result<Self> {
        let setting_name = setting_name.into();
        let mut problems = Vec::new();

        let item = descriptor
            .item
            .map(|(get, set)| Accessor::Explicit { get, set });

        let object = descriptor.object.and_then(|binding| {
            resolve_object(binding)
                .map_err(|reason| problems.push(format!("object: {}", reason)))
                .ok()
        });

        let menu = descriptor.menu.and_then(|(menu, path)| {
            resolve_menu(menu, &path)
                .map_err(|reason| problems.push(format!("menu: {}", reason)))
                .ok()
        });

        let authority = if item.is_some() {
            Authority::Item
        } else if object.is_some() {
            Authority::Object
        } else if menu.is_some() {
            Authority::Menu
        } else {
            let reason = if problems.is_empty() {
                "no bindings specified".to_string()
            } else {
                problems.join("; ")
            };
            return Err(Error::InvalidBinding {
                setting: setting_name,
                reason,
            });
        };

        for problem in &problems {
            warn!(setting = %setting_name, "skipping binding ({})", problem);
        }

        Ok(Self {
            setting_name,
            authority,
            item,
            object,
            menu,
        })
    }

    pub fn setting_name(&self) -> &str {
        &self.setting_name
    }

    pub fn authority(&self) -> Authority {
        self.authority
    }

    fn primary(&self) -> &Accessor {
        let primary = match self.authority {
            Authority::Item => self.item.as_ref(),
            Authority::Object => self.object.as_ref(),
            Authority::Menu => self.menu.as_ref(),
        };
        // The authority is only ever chosen from a binding that resolved.
        primary.unwrap_or_else(|| unreachable!("authority without a binding"))
    }

    fn secondaries(&self) -> impl Iterator<Item = &Accessor> {
        let authority = self.authority;
        [
            (Authority::Item, self.item.as_ref()),
            (Authority::Object, self.object.as_ref()),
            (Authority::Menu, self.menu.as_ref()),
        ]
        .into_iter()
        .filter(move |(kind, _)| *kind != authority)
        .filter_map(|(_, accessor)| accessor)
    }

    /// Current value of the primary authority.
    pub fn get(&self) -> Value {
        self.primary().get()
    }

    /// Write `value` to every configured binding.
    pub fn set(&self, value: Value) {
        for accessor in [&self.item, &self.object, &self.menu].into_iter().flatten() {
            accessor.set(value.clone());
        }
    }

    /// Force secondary bindings back in line with the primary.
    ///
    /// Returns the number of bindings that had drifted.
    pub fn resync(&self) -> usize {
        let value = self.get();
        let mut corrected = 0;
        for accessor in self.secondaries() {
            if !accessor.matches(&value) {
                debug!(setting = %self.setting_name, "resync {} -> {}", self.authority, value);
                accessor.set(value.clone());
                corrected += 1;
            }
        }
        corrected
    }
}

impl fmt::Debug for DualAuthorityItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DualAuthorityItem")
            .field("setting_name", &self.setting_name)
            .field("authority", &self.authority)
            .field("object", &self.object.is_some())
            .field("menu", &self.menu.is_some())
            .finish()
    }
}
