//! Embedded Lua module loader
//!
//! Injected into the generated block's header unless the project disables it
//! with `"insertModuleLoader": false`. It gives bundled code a tiny runtime
//! module system: `WM` declares a module, `importWM` loads and imports one,
//! `loadAllWMs` disables lazy loading by resolving everything eagerly.

/// The loader script. Module resolution depth shares the same bound as the
/// resolver so a declaration loop fails loudly instead of hanging the map.
pub const MODULE_LOADER: &str = r#"-- Module loader
local lupackModules = {}

function lupackDeclareModule(name, dependenciesOrContext, context)
  local theModule = {
    loaded = false,
    dependencies = {},
    context = nil,
    exports = {},
    exportDefault = nil
  }
  if (type(context) == "function") then
    theModule.context = context
    if (type(dependenciesOrContext) == "table") then
      theModule.dependencies = dependenciesOrContext
    end
  elseif (type(dependenciesOrContext) == "function") then
    theModule.context = dependenciesOrContext
  else
    print("Lupack Error: wrong module declaration: '" .. name .. "'. Module requires a context function callback.")
    return
  end
  lupackModules[name] = theModule
end

function lupackLoadModule(name, depth)
  local theModule = lupackModules[name]
  if (type(depth) == 'number') then
    if (depth > 512) then
      print("Lupack Error: dependency loop detected for the module '" .. name .. "'")
      return
    end
    depth = depth + 1
  else
    depth = 0
  end
  if (type(theModule) ~= "table") then
    print("Lupack Error: module '" .. name .. "' not exists or not yet loaded. Call importWM at your initialization section")
    return
  elseif (not theModule.loaded) then
    for _, dependency in ipairs(theModule.dependencies) do
      lupackLoadModule(dependency, depth)
    end

    local cb_import = function(moduleOrWhatToImport, moduleToImport)
      if (type(moduleToImport) ~= "string") then
        return lupackImportModule(moduleOrWhatToImport)
      end
      return lupackImportModule(moduleToImport, moduleOrWhatToImport)
    end
    local cb_export = function(whatToExport, singleValue)
      if (type(whatToExport) == "table") then
        for k,v in pairs(whatToExport) do theModule.exports[k] = v end
      elseif (type(whatToExport) == "string") then
        theModule.exports[whatToExport] = singleValue
      else
        print("Lupack Error: wrong export syntax in module '" .. name .. "'. Use export() with a single object arg or key-value args")
        return
      end
    end
    local cb_exportDefault = function(defaultExport)
      if (defaultExport == nil) then
        print("Lupack Error: wrong default export syntax in module '" .. name .. "'. Use exportDefault() with an argument")
        return
      end
      theModule.exportDefault = defaultExport
    end

    theModule.context(cb_import, cb_export, cb_exportDefault)
    theModule.loaded = true
  end

  return theModule
end

function lupackImportModule(name, whatToImport)
  local theModule = lupackLoadModule(name)
  if (type(whatToImport) == "string") then
    if (theModule.exports[whatToImport] == nil) then
      print("Lupack Error: name '" .. whatToImport .. "' was never exported by the module '" .. name .. "'")
      return
    end
    return theModule.exports[whatToImport]
  end
  return theModule.exportDefault
end

function lupackLoadAllModules()
  for name,theModule in pairs(lupackModules) do lupackLoadModule(name) end
end

WM = lupackDeclareModule
importWM = lupackImportModule
loadAllWMs = lupackLoadAllModules
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_declares_public_api() {
        assert!(MODULE_LOADER.contains("WM = lupackDeclareModule"));
        assert!(MODULE_LOADER.contains("importWM = lupackImportModule"));
        assert!(MODULE_LOADER.contains("loadAllWMs = lupackLoadAllModules"));
    }

    #[test]
    fn test_loader_bounds_module_resolution_depth() {
        assert!(MODULE_LOADER.contains("depth > 512"));
    }
}
