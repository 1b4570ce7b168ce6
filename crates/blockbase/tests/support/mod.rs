//! Scriptable mock host shared by the integration suites.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};

use blockbase::global_config::StandardGlobalConfigHelpers;
use blockbase::host::{
    ApplyMutationOptions, FieldTypeProvider, GlobalConfigHelpers, HostError, HostInterface,
    PermissionCheckResult, SdkInitData, ValueValidationResult,
};
use blockbase::mutations::Mutation;

pub struct ScriptableFieldTypeProvider {
    pub verdict: RefCell<ValueValidationResult>,
}

impl FieldTypeProvider for ScriptableFieldTypeProvider {
    fn validate_cell_value_for_update(
        &self,
        _app_interface: &Value,
        _new_cell_value: Option<&Value>,
        _current_cell_value: Option<&Value>,
        _field_data: &Value,
    ) -> ValueValidationResult {
        self.verdict.borrow().clone()
    }
}

/// Records every call and lets tests script permission and persistence
/// results, plus a hook that runs inside `apply_mutation` to observe state
/// at the moment the mutation reaches the host.
pub struct MockHost {
    init: SdkInitData,
    pub permission_result: RefCell<PermissionCheckResult>,
    pub apply_result: RefCell<Result<(), HostError>>,
    pub applied: RefCell<Vec<(Mutation, ApplyMutationOptions)>>,
    pub permission_checks: RefCell<Vec<Value>>,
    pub on_apply: RefCell<Option<Box<dyn Fn(&Mutation)>>>,
    helpers: StandardGlobalConfigHelpers,
    pub field_provider: ScriptableFieldTypeProvider,
}

impl MockHost {
    pub fn new(init: SdkInitData) -> Rc<Self> {
        Rc::new(MockHost {
            init,
            permission_result: RefCell::new(PermissionCheckResult::allowed()),
            apply_result: RefCell::new(Ok(())),
            applied: RefCell::new(Vec::new()),
            permission_checks: RefCell::new(Vec::new()),
            on_apply: RefCell::new(None),
            helpers: StandardGlobalConfigHelpers,
            field_provider: ScriptableFieldTypeProvider {
                verdict: RefCell::new(ValueValidationResult {
                    is_valid: true,
                    reason: None,
                }),
            },
        })
    }

    pub fn applied_count(&self) -> usize {
        self.applied.borrow().len()
    }
}

impl HostInterface for MockHost {
    fn sdk_init_data(&self) -> SdkInitData {
        self.init.clone()
    }

    fn check_permissions_for_mutation(
        &self,
        mutation: &Value,
        _base_permission_data: &Value,
    ) -> PermissionCheckResult {
        self.permission_checks.borrow_mut().push(mutation.clone());
        self.permission_result.borrow().clone()
    }

    fn apply_mutation(
        &self,
        mutation: &Mutation,
        options: &ApplyMutationOptions,
    ) -> Result<(), HostError> {
        if let Some(hook) = self.on_apply.borrow().as_ref() {
            hook(mutation);
        }
        self.applied.borrow_mut().push((mutation.clone(), *options));
        self.apply_result.borrow().clone()
    }

    fn global_config_helpers(&self) -> &dyn GlobalConfigHelpers {
        &self.helpers
    }

    fn field_type_provider(&self) -> &dyn FieldTypeProvider {
        &self.field_provider
    }
}

/// Base with one text field and one loaded record (`recA.fldY = "old"`).
pub fn init_data_with_loaded_record() -> SdkInitData {
    SdkInitData {
        initial_kv_values_by_key: json!({}),
        base_data: json!({
            "id": "app1",
            "name": "Test base",
            "tableOrder": ["tblX"],
            "tablesById": {
                "tblX": {
                    "id": "tblX",
                    "name": "Things",
                    "fieldOrder": ["fldY"],
                    "fieldsById": {
                        "fldY": {"id": "fldY", "name": "Label", "type": "text", "isComputed": false},
                        "fldZ": {"id": "fldZ", "name": "Total", "type": "formula", "isComputed": true}
                    },
                    "recordsById": {
                        "recA": {"id": "recA", "cellValuesByFieldId": {"fldY": "old"}, "commentCount": 0}
                    }
                }
            },
            "permissionLevel": "create",
            "currentUserId": "usr1",
            "collaboratorsById": {"usr1": {"id": "usr1", "name": "Ada"}}
        }),
        block_installation_id: "blk1".to_string(),
        is_fullscreen: false,
        is_first_run: false,
        intent_data: None,
        run_context: json!({"type": "dashboard"}),
    }
}

/// Same schema but records never loaded (no `recordsById`).
pub fn init_data_without_loaded_records() -> SdkInitData {
    let mut init = init_data_with_loaded_record();
    let table = init
        .base_data
        .pointer_mut("/tablesById/tblX")
        .expect("table data");
    table
        .as_object_mut()
        .expect("table object")
        .remove("recordsById");
    init
}
